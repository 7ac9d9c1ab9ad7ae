use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use async_trait::async_trait;
use tracing::{info, warn};

/// Re-reads one handler manifest from disk and swaps it in.
pub struct Reload;

#[async_trait]
impl CommandAction for Reload {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let Some(name) = ctx.invocation.string_option("name").map(str::trim) else {
            ctx.reply(Reply::text("❌ Tell me which handler to reload.").ephemeral())
                .await?;
            return Ok(());
        };
        let name = name.to_string();

        let embed = match ctx.registry.reload(&name) {
            Ok(kind) => {
                info!(handler = %name, %kind, caller = ctx.invocation.caller.id, "Handler reloaded");
                Embed::new()
                    .title("🔄 Reloaded")
                    .color(EmbedColor::Success)
                    .description(format!("The {kind} `{name}` was reloaded from disk."))
            }
            Err(e) if e.is_not_found() => Embed::new()
                .title("❓ Unknown handler")
                .color(EmbedColor::Warning)
                .description(format!("No reloadable command or event is named `{name}`.")),
            Err(e) => {
                warn!(handler = %name, error = %e, "Reload failed, previous version kept");
                let detail = match e.invalid_field() {
                    Some(field) => format!("The manifest has a problem in `{field}`."),
                    None => "The manifest could not be loaded.".to_string(),
                };
                Embed::new()
                    .title("⚠️ Reload failed")
                    .color(EmbedColor::Error)
                    .description(format!("{detail} The previous version is still active."))
            }
        };

        ctx.reply(Reply::embed(embed).ephemeral()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::interaction::testing::{guild_interaction, Sent};
    use crate::core::dispatch::OptionValue;
    use crate::core::events::EventBus;
    use crate::core::handlers::{ActionCatalog, Data, Registry};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Noop;

    #[async_trait]
    impl CommandAction for Noop {
        async fn execute(&self, _ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    async fn reload(registry: &Registry, name: &str) -> Embed {
        let data = Data::detached();
        let (mut interaction, transport) = guild_interaction("reload", 1, &["Administrator"]);
        interaction.invocation = interaction
            .invocation
            .clone()
            .with_option("name", OptionValue::String(name.into()));

        let mut ctx = CommandContext::new(
            &interaction.invocation,
            &mut interaction.responder,
            &data,
            registry,
        );
        Reload.execute(&mut ctx).await.unwrap();

        match transport.log().as_slice() {
            [Sent::Reply(reply)] => reply.embeds[0].clone(),
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    fn registry() -> Registry {
        Registry::new(
            Arc::new(ActionCatalog::new().command("test.noop", || Noop)),
            Arc::new(EventBus::new()),
            Arc::new(Data::detached()),
        )
    }

    #[tokio::test]
    async fn reloads_a_command_from_its_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        fs::write(&path, r#"{"name":"stats","execute":"test.noop"}"#).unwrap();

        let registry = registry();
        registry.load_command(&path).unwrap();
        fs::write(
            &path,
            r#"{"name":"stats","execute":"test.noop","description":"v2"}"#,
        )
        .unwrap();

        let embed = reload(&registry, "stats").await;
        assert_eq!(embed.title.as_deref(), Some("🔄 Reloaded"));
        assert_eq!(registry.commands().get("stats").unwrap().meta.description, "v2");
    }

    #[tokio::test]
    async fn broken_manifest_keeps_the_old_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        fs::write(&path, r#"{"name":"stats","execute":"test.noop"}"#).unwrap();

        let registry = registry();
        registry.load_command(&path).unwrap();
        fs::write(&path, r#"{"name":"stats","execute":"test.noop","cooldown":"soon"}"#).unwrap();

        let embed = reload(&registry, "stats").await;
        assert_eq!(embed.title.as_deref(), Some("⚠️ Reload failed"));
        assert!(embed.description.unwrap().contains("`cooldown`"));
        assert!(registry.commands().contains("stats"));
    }

    #[tokio::test]
    async fn unknown_name_is_not_an_error() {
        let embed = reload(&registry(), "ghost").await;
        assert_eq!(embed.title.as_deref(), Some("❓ Unknown handler"));
    }
}
