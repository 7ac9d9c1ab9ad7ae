use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, EventInfo, HandlerError};
use async_trait::async_trait;
use tracing::info;

/// Lists event handlers and switches them on or off at runtime.
pub struct Events;

fn listing(infos: &[EventInfo], event_type: Option<&str>) -> Embed {
    let title = match event_type {
        Some(kind) => format!("📡 {kind} events ({})", infos.len()),
        None => format!("📡 Events ({})", infos.len()),
    };
    if infos.is_empty() {
        return Embed::new()
            .title(title)
            .color(EmbedColor::Info)
            .description("No event handlers match.");
    }

    let lines: Vec<String> = infos
        .iter()
        .map(|info| {
            let state = if info.enabled { "🟢" } else { "⚪" };
            let once = if info.once { " · once" } else { "" };
            format!("{state} `{}` ({}){once}", info.name, info.event_type)
        })
        .collect();
    Embed::new()
        .title(title)
        .color(EmbedColor::Info)
        .description(lines.join("\n"))
}

#[async_trait]
impl CommandAction for Events {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let action = ctx.invocation.string_option("action").unwrap_or("list");
        let events = ctx.registry.events();

        let embed = match action {
            "list" => {
                let event_type = ctx.invocation.string_option("type").map(str::trim);
                let infos = match event_type {
                    Some(kind) => events.by_type(kind),
                    None => events.info(),
                };
                listing(&infos, event_type)
            }
            "enable" | "disable" => {
                let Some(name) = ctx.invocation.string_option("name").map(str::trim) else {
                    ctx.reply(Reply::text("❌ Tell me which event handler to switch.").ephemeral())
                        .await?;
                    return Ok(());
                };
                let switched = if action == "enable" {
                    events.enable(name)
                } else {
                    events.disable(name)
                };
                match switched {
                    Ok(()) => {
                        info!(event = %name, action, caller = ctx.invocation.caller.id, "Event handler switched");
                        Embed::new()
                            .title(format!("✅ Event {action}d"))
                            .color(EmbedColor::Success)
                            .description(format!("`{name}` is now {action}d."))
                    }
                    Err(e) if e.is_not_found() => Embed::new()
                        .title("❓ Unknown event")
                        .color(EmbedColor::Warning)
                        .description(format!("No event handler is named `{name}`.")),
                    Err(e) => return Err(e.into()),
                }
            }
            other => Embed::new()
                .title("❓ Unknown action")
                .color(EmbedColor::Warning)
                .description(format!("`{other}` is not one of `list`, `enable` or `disable`.")),
        };

        ctx.reply(Reply::embed(embed).ephemeral()).await?;
        Ok(())
    }
}
