use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use async_trait::async_trait;
use std::time::Instant;

/// Round-trip check: defers, then edits the deferred reply with timings.
pub struct Ping;

fn latency_status(ms: u128) -> &'static str {
    match ms {
        0..=99 => "🟢 Excellent",
        100..=199 => "🟡 Good",
        200..=299 => "🟠 Fair",
        _ => "🔴 Poor",
    }
}

#[async_trait]
impl CommandAction for Ping {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let started = Instant::now();
        ctx.defer(false).await?;
        let elapsed = started.elapsed().as_millis();

        let embed = Embed::new()
            .title("🏓 Pong!")
            .color(EmbedColor::Success)
            .field("⏱️ Response time", format!("{elapsed}ms"), true)
            .field("📊 Status", latency_status(elapsed), true)
            .footer(format!("Requested by {}", ctx.invocation.caller.name))
            .timestamp_now();

        ctx.edit_reply(Reply::embed(embed)).await?;
        Ok(())
    }
}
