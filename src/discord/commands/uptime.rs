use crate::core::dispatch::Reply;
use crate::core::embeds::{format_duration, Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use async_trait::async_trait;

pub struct Uptime;

#[async_trait]
impl CommandAction for Uptime {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let minutes = ctx.data.uptime_secs() / 60;
        let since = ctx.data.started_at.format("%Y-%m-%d %H:%M UTC").to_string();

        let embed = Embed::new()
            .title("⏳ Uptime")
            .color(EmbedColor::Info)
            .field("Online for", format_duration(minutes), true)
            .field("Since", since, true)
            .field(
                "Handlers",
                format!(
                    "{} commands, {} events",
                    ctx.registry.commands().len(),
                    ctx.registry.events().len()
                ),
                false,
            );

        ctx.reply(Reply::embed(embed)).await?;
        Ok(())
    }
}
