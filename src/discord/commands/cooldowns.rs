use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use async_trait::async_trait;
use tracing::info;

const MAX_LISTED: usize = 15;

/// Lists or resets active command cooldowns.
pub struct Cooldowns;

#[async_trait]
impl CommandAction for Cooldowns {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let controls = ctx.controls()?;
        let action = ctx.invocation.string_option("action").unwrap_or("list");

        let embed = match action {
            "list" => {
                let active = controls.cooldowns.snapshot();
                if active.is_empty() {
                    Embed::new()
                        .title("⏱️ Cooldowns")
                        .color(EmbedColor::Info)
                        .description("Nobody is on cooldown right now.")
                } else {
                    let mut lines: Vec<String> = active
                        .iter()
                        .take(MAX_LISTED)
                        .map(|entry| {
                            format!(
                                "`/{}` <@{}> until <t:{}:R>",
                                entry.command,
                                entry.user_id,
                                entry.expires_at_ms / 1000
                            )
                        })
                        .collect();
                    if active.len() > MAX_LISTED {
                        lines.push(format!("…and {} more", active.len() - MAX_LISTED));
                    }
                    Embed::new()
                        .title(format!("⏱️ Cooldowns ({})", active.len()))
                        .color(EmbedColor::Info)
                        .description(lines.join("\n"))
                }
            }
            "reset" => {
                let user = ctx.invocation.user_option("user");
                let command = ctx.invocation.string_option("command").map(str::trim);
                let (cleared, scope) = match (user, command) {
                    (Some(user_id), None) => {
                        (controls.cooldowns.clear_for_user(user_id), format!("<@{user_id}>"))
                    }
                    (None, Some(command)) if !command.is_empty() => (
                        controls.cooldowns.clear_for_command(command),
                        format!("`/{command}`"),
                    ),
                    _ => {
                        ctx.reply(
                            Reply::text("❌ Give either a user or a command to reset.").ephemeral(),
                        )
                        .await?;
                        return Ok(());
                    }
                };
                info!(cleared, scope = %scope, caller = ctx.invocation.caller.id, "Cooldowns reset");
                Embed::new()
                    .title("♻️ Cooldowns reset")
                    .color(EmbedColor::Success)
                    .description(format!("Cleared {cleared} cooldown(s) for {scope}."))
            }
            other => Embed::new()
                .title("❓ Unknown action")
                .color(EmbedColor::Warning)
                .description(format!("`{other}` is not one of `list` or `reset`.")),
        };

        ctx.reply(Reply::embed(embed).ephemeral()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::OptionValue;
    use crate::core::handlers::{ActionCatalog, Data};
    use crate::discord::commands::testing::{text, AdminBench};
    use std::time::Duration;

    fn bench() -> AdminBench {
        let bench = AdminBench::new(ActionCatalog::new(), Data::detached());
        bench.cooldowns.mark_used("ping", 7, Duration::from_secs(60));
        bench.cooldowns.mark_used("kick", 7, Duration::from_secs(60));
        bench.cooldowns.mark_used("ping", 8, Duration::from_secs(60));
        bench
    }

    #[tokio::test]
    async fn lists_active_cooldowns() {
        let bench = bench();

        let reply = bench.run(&Cooldowns, "cooldowns", &[("action", text("list"))]).await;

        assert!(reply.ephemeral);
        let embed = &reply.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("⏱️ Cooldowns (3)"));
        assert!(embed.description.as_deref().unwrap().contains("`/kick` <@7>"));
    }

    #[tokio::test]
    async fn resets_by_user_or_by_command() {
        let bench = bench();

        bench
            .run(&Cooldowns, "cooldowns", &[("action", text("reset")), ("user", OptionValue::User(7))])
            .await;
        assert!(!bench.cooldowns.is_on_cooldown("kick", 7));
        assert!(bench.cooldowns.is_on_cooldown("ping", 8));

        let reply = bench
            .run(&Cooldowns, "cooldowns", &[("action", text("reset")), ("command", text("ping"))])
            .await;
        assert_eq!(bench.cooldowns.snapshot().len(), 0);
        assert_eq!(
            reply.embeds[0].description.as_deref(),
            Some("Cleared 1 cooldown(s) for `/ping`.")
        );
    }

    #[tokio::test]
    async fn reset_needs_exactly_one_scope() {
        let bench = bench();

        let reply = bench.run(&Cooldowns, "cooldowns", &[("action", text("reset"))]).await;

        assert_eq!(
            reply.content.as_deref(),
            Some("❌ Give either a user or a command to reset.")
        );
        assert_eq!(bench.cooldowns.snapshot().len(), 3);
    }
}
