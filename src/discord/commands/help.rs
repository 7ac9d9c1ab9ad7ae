use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, CommandInfo, HandlerError};
use async_trait::async_trait;
use std::collections::BTreeMap;

// Known categories first, anything else alphabetically after them.
const CATEGORY_ORDER: &[&str] = &["utility", "moderation", "admin", "general"];
const MAX_SEARCH_RESULTS: usize = 10;

fn category_emoji(category: &str) -> &'static str {
    match category {
        "utility" => "🧰",
        "moderation" => "🛡️",
        "admin" => "⚙️",
        "general" => "📌",
        _ => "•",
    }
}

fn category_rank(category: &str) -> usize {
    CATEGORY_ORDER
        .iter()
        .position(|known| *known == category)
        .unwrap_or(CATEGORY_ORDER.len())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn command_line(info: &CommandInfo) -> String {
    if info.description.is_empty() {
        format!("`/{}`", info.name)
    } else {
        format!("`/{}` {}", info.name, info.description)
    }
}

/// Commands grouped by category, in display order.
fn grouped(commands: Vec<CommandInfo>) -> Vec<(String, Vec<CommandInfo>)> {
    let mut groups: BTreeMap<String, Vec<CommandInfo>> = BTreeMap::new();
    for info in commands {
        groups.entry(info.category.clone()).or_default().push(info);
    }

    let mut ordered: Vec<_> = groups.into_iter().collect();
    ordered.sort_by(|(a, _), (b, _)| category_rank(a).cmp(&category_rank(b)).then(a.cmp(b)));
    for (_, infos) in &mut ordered {
        infos.sort_by(|a, b| a.name.cmp(&b.name));
    }
    ordered
}

fn overview_embed(commands: Vec<CommandInfo>) -> Embed {
    let total = commands.len();
    let mut embed = Embed::new()
        .title("📖 Commands")
        .color(EmbedColor::Info)
        .description(
            "Use `/help query:<text>` to search by name, alias or description, \
             or `/help category:<name>` for one category.",
        );

    for (category, infos) in grouped(commands) {
        let lines: Vec<String> = infos.iter().map(command_line).collect();
        embed = embed.field(
            format!("{} {}", category_emoji(&category), title_case(&category)),
            lines.join("\n"),
            false,
        );
    }

    embed.footer(format!("{total} commands available"))
}

fn search_embed(query: &str, matches: Vec<CommandInfo>) -> Embed {
    if matches.is_empty() {
        return Embed::new()
            .title("🔍 No matches")
            .color(EmbedColor::Warning)
            .description(format!("Nothing matched `{query}`."));
    }

    let mut embed = Embed::new()
        .title(format!("🔍 Results for \"{query}\""))
        .color(EmbedColor::Info);
    for info in matches.into_iter().take(MAX_SEARCH_RESULTS) {
        let mut details = vec![if info.description.is_empty() {
            "No description".to_string()
        } else {
            info.description.clone()
        }];
        details.push(format!("Usage: `{}`", info.usage));
        if info.cooldown_ms > 0 {
            details.push(format!("Cooldown: {}s", info.cooldown_ms.div_ceil(1000)));
        }
        if !info.permissions.is_empty() {
            details.push(format!("Requires: {}", info.permissions.join(", ")));
        }
        embed = embed.field(format!("/{}", info.name), details.join("\n"), false);
    }
    embed
}

/// Lists commands by category, or ranks them against `query`.
pub struct Help;

#[async_trait]
impl CommandAction for Help {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let commands = ctx.registry.commands();
        let query = ctx.invocation.string_option("query").map(str::trim);
        let category = ctx.invocation.string_option("category").map(str::trim);
        let embed = match (query, category) {
            (Some(query), _) if !query.is_empty() => {
                let matches = commands
                    .search(query)
                    .iter()
                    .map(|descriptor| CommandInfo::from(&descriptor.meta))
                    .collect();
                search_embed(query, matches)
            }
            (_, Some(category)) if !category.is_empty() => {
                let infos: Vec<CommandInfo> = commands
                    .by_category(category)
                    .iter()
                    .map(|descriptor| CommandInfo::from(&descriptor.meta))
                    .collect();
                if infos.is_empty() {
                    Embed::new()
                        .title("🔍 No matches")
                        .color(EmbedColor::Warning)
                        .description(format!("No commands in category `{category}`."))
                } else {
                    overview_embed(infos)
                }
            }
            _ => overview_embed(commands.info()),
        };

        ctx.reply(Reply::embed(embed).ephemeral()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handlers::{ActionCatalog, CommandDescriptor, Data, HandlerMeta};
    use crate::discord::commands::testing::{text, AdminBench};
    use std::sync::Arc;

    fn info(name: &str, category: &str) -> CommandInfo {
        CommandInfo::from(&HandlerMeta::named(name).category(category).description("does things"))
    }

    #[test]
    fn known_categories_come_first() {
        let groups = grouped(vec![
            info("zeta", "fun"),
            info("kick", "moderation"),
            info("ping", "utility"),
            info("help", "utility"),
            info("alpha", "art"),
        ]);

        let order: Vec<&str> = groups.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(order, vec!["utility", "moderation", "art", "fun"]);

        let utility: Vec<&str> = groups[0].1.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(utility, vec!["help", "ping"]);
    }

    #[test]
    fn search_embed_reports_misses() {
        let embed = search_embed("zzz", Vec::new());
        assert_eq!(embed.title.as_deref(), Some("🔍 No matches"));
    }

    #[test]
    fn search_embed_lists_cooldown_and_permissions() {
        let meta = HandlerMeta::named("kick")
            .cooldown_ms(5000)
            .permissions(["KickMembers"]);
        let embed = search_embed("kick", vec![CommandInfo::from(&meta)]);

        assert_eq!(embed.fields.len(), 1);
        assert!(embed.fields[0].value.contains("Cooldown: 5s"));
        assert!(embed.fields[0].value.contains("Requires: KickMembers"));
    }

    #[tokio::test]
    async fn category_option_narrows_the_overview() {
        let bench = AdminBench::new(ActionCatalog::new(), Data::detached());
        let commands = bench.registry.commands();
        for (name, category) in [("kick", "moderation"), ("ping", "utility"), ("uptime", "utility")] {
            commands
                .register(CommandDescriptor::new(
                    HandlerMeta::named(name).category(category),
                    Arc::new(Help),
                ))
                .unwrap();
        }

        let reply = bench.run(&Help, "help", &[("category", text("Utility"))]).await;
        let embed = &reply.embeds[0];
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.footer.as_deref(), Some("2 commands available"));

        let empty = bench.run(&Help, "help", &[("category", text("fun"))]).await;
        assert_eq!(empty.embeds[0].title.as_deref(), Some("🔍 No matches"));
    }
}
