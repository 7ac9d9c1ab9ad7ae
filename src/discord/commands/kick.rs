use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use crate::core::moderation::check_target;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const DEFAULT_REASON: &str = "No reason provided";

/// Removes a member after the role hierarchy checks pass.
pub struct Kick;

async fn refuse(ctx: &mut CommandContext<'_>, message: &str) -> Result<(), HandlerError> {
    ctx.reply(Reply::text(format!("❌ {message}")).ephemeral()).await?;
    Ok(())
}

#[async_trait]
impl CommandAction for Kick {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let Some(guild_id) = ctx.invocation.guild_id else {
            return refuse(ctx, "This command only works inside a server.").await;
        };
        let Some(target_id) = ctx.invocation.user_option("target") else {
            return refuse(ctx, "Pick a member to kick.").await;
        };
        let reason = ctx
            .invocation
            .string_option("reason")
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASON)
            .to_string();

        let moderation = Arc::clone(&ctx.data.moderation);
        let Some(target) = moderation.member(guild_id, target_id).await? else {
            return refuse(ctx, "User not found in this server!").await;
        };
        let Some(caller) = moderation
            .member(guild_id, ctx.invocation.caller.id)
            .await?
        else {
            return refuse(ctx, "Could not resolve your membership in this server.").await;
        };
        let bot = moderation.bot_member(guild_id).await?;
        let owner_id = moderation.guild_owner(guild_id).await?;

        if let Err(refusal) = check_target(&caller, &target, &bot, owner_id) {
            return refuse(ctx, refusal.message()).await;
        }

        moderation.kick(guild_id, target.user_id, &reason).await?;
        info!(
            guild_id,
            target = target.user_id,
            moderator = caller.user_id,
            reason = %reason,
            "Member kicked"
        );

        let guild_name = ctx
            .invocation
            .guild_name
            .clone()
            .unwrap_or_else(|| guild_id.to_string());
        let embed = Embed::new()
            .title("✅ Member kicked")
            .color(EmbedColor::Success)
            .field(
                "👤 Member",
                format!("{} ({})", target.display_name, target.user_id),
                true,
            )
            .field("👮 Moderator", ctx.invocation.caller.name.clone(), true)
            .field("📝 Reason", reason, false)
            .footer(format!("Server: {guild_name}"))
            .timestamp_now();

        ctx.reply(Reply::embed(embed)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::interaction::testing::{guild_interaction, Sent};
    use crate::core::dispatch::{CommandInteraction, OptionValue};
    use crate::core::events::EventBus;
    use crate::core::handlers::{ActionCatalog, Data, Registry};
    use crate::core::moderation::testing::{member, FakeGuild};
    use crate::core::moderation::TargetRefusal;

    const OWNER: u64 = 1;
    const MODERATOR: u64 = 10;
    const TARGET: u64 = 20;

    fn guild() -> Arc<FakeGuild> {
        Arc::new(
            FakeGuild::new(OWNER, 50)
                .with_member(member(OWNER, 99))
                .with_member(member(MODERATOR, 30))
                .with_member(member(TARGET, 10)),
        )
    }

    async fn run(guild: Arc<FakeGuild>, interaction: &mut CommandInteraction) {
        let data = Data::new(guild);
        let registry = Registry::new(
            Arc::new(ActionCatalog::new()),
            Arc::new(EventBus::new()),
            Arc::new(Data::detached()),
        );
        let mut ctx = CommandContext::new(
            &interaction.invocation,
            &mut interaction.responder,
            &data,
            &registry,
        );
        Kick.execute(&mut ctx).await.unwrap();
    }

    fn kick_interaction(caller: u64, target: u64) -> (CommandInteraction, impl Fn() -> Vec<Sent>) {
        let (mut interaction, transport) = guild_interaction("kick", caller, &["KickMembers"]);
        interaction.invocation = interaction
            .invocation
            .clone()
            .with_option("target", OptionValue::User(target))
            .with_option("reason", OptionValue::String("spam".into()));
        (interaction, move || transport.log())
    }

    #[tokio::test]
    async fn kicks_a_lower_ranked_member() {
        let guild = guild();
        let (mut interaction, log) = kick_interaction(MODERATOR, TARGET);

        run(Arc::clone(&guild), &mut interaction).await;

        assert_eq!(guild.kicked(), vec![(TARGET, "spam".to_string())]);
        match log().as_slice() {
            [Sent::Reply(reply)] => {
                assert!(!reply.ephemeral);
                assert_eq!(reply.embeds[0].title.as_deref(), Some("✅ Member kicked"));
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refuses_to_kick_upwards() {
        let guild = guild();
        let (mut interaction, log) = kick_interaction(TARGET, MODERATOR);

        run(Arc::clone(&guild), &mut interaction).await;

        assert!(guild.kicked().is_empty());
        match log().as_slice() {
            [Sent::Reply(reply)] => {
                assert!(reply.ephemeral);
                assert_eq!(
                    reply.content.as_deref(),
                    Some(format!("❌ {}", TargetRefusal::OutranksCaller.message()).as_str())
                );
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_target_is_reported() {
        let guild = guild();
        let (mut interaction, log) = kick_interaction(MODERATOR, 777);

        run(Arc::clone(&guild), &mut interaction).await;

        assert!(guild.kicked().is_empty());
        assert!(matches!(
            log().as_slice(),
            [Sent::Reply(reply)] if reply.content.as_deref() == Some("❌ User not found in this server!")
        ));
    }
}
