use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use crate::core::plugins::ModuleError;
use async_trait::async_trait;
use tracing::{info, warn};

/// Lists plugin modules, shows one in detail, or reloads it from disk.
pub struct Modules;

fn names_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names
            .iter()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn unknown(name: &str) -> Embed {
    Embed::new()
        .title("❓ Unknown module")
        .color(EmbedColor::Warning)
        .description(format!("No module named `{name}` is loaded."))
}

#[async_trait]
impl CommandAction for Modules {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let controls = ctx.controls()?;
        let action = ctx.invocation.string_option("action").unwrap_or("list");
        let name = ctx.invocation.string_option("name").map(str::trim);

        let embed = match (action, name) {
            ("list", _) => {
                let lines: Vec<String> = controls
                    .modules
                    .list_loaded()
                    .into_iter()
                    .filter_map(|name| controls.modules.module_info(&name))
                    .map(|record| {
                        format!(
                            "📦 **{}** v{} · {} command(s), {} event(s)",
                            record.module.name,
                            record.module.version,
                            record.module.commands.len(),
                            record.module.events.len()
                        )
                    })
                    .collect();
                let description = if lines.is_empty() {
                    "No modules are loaded.".to_string()
                } else {
                    lines.join("\n")
                };
                Embed::new()
                    .title(format!("🧩 Modules ({})", lines.len()))
                    .color(EmbedColor::Info)
                    .description(description)
            }
            ("info", Some(name)) => match controls.modules.module_info(name) {
                Some(record) => {
                    let module = &record.module;
                    let mut embed = Embed::new()
                        .title(format!("🧩 {} v{}", module.name, module.version))
                        .color(EmbedColor::Info)
                        .field("Commands", names_or_none(&module.commands), false)
                        .field("Events", names_or_none(&module.events), false)
                        .field(
                            "Loaded",
                            format!("<t:{}:R>", record.loaded_at.timestamp()),
                            true,
                        )
                        .field("Source", record.source_path.display().to_string(), true);
                    if !module.description.is_empty() {
                        embed = embed.description(module.description.clone());
                    }
                    embed
                }
                None => unknown(name),
            },
            ("reload", Some(name)) => match controls.modules.reload_module(name).await {
                Ok(record) => {
                    info!(module = %name, caller = ctx.invocation.caller.id, "Module reloaded");
                    Embed::new()
                        .title("🔄 Module reloaded")
                        .color(EmbedColor::Success)
                        .description(format!(
                            "`{}` v{} is active again.",
                            record.module.name, record.module.version
                        ))
                }
                Err(ModuleError::NotFound(_)) => unknown(name),
                Err(e) => {
                    warn!(module = %name, error = %e, "Module reload failed");
                    Embed::new()
                        .title("⚠️ Reload failed")
                        .color(EmbedColor::Error)
                        .description(format!("`{name}` could not be reloaded: {e}"))
                }
            },
            ("info" | "reload", None) => {
                ctx.reply(Reply::text("❌ Tell me which module you mean.").ephemeral())
                    .await?;
                return Ok(());
            }
            (other, _) => Embed::new()
                .title("❓ Unknown action")
                .color(EmbedColor::Warning)
                .description(format!("`{other}` is not one of `list`, `info` or `reload`.")),
        };

        ctx.reply(Reply::embed(embed).ephemeral()).await?;
        Ok(())
    }
}
