use crate::core::dispatch::Reply;
use crate::core::embeds::{Embed, EmbedColor};
use crate::core::handlers::{CommandAction, CommandContext, HandlerError};
use crate::core::moderation::MemberSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 90;
const MAX_LISTED: usize = 20;

/// Lists members whose account or membership is newer than a cutoff.
pub struct RecentAccounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recency {
    Account,
    Joined,
    Both,
}

impl Recency {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "account" => Some(Recency::Account),
            "joined" => Some(Recency::Joined),
            "both" => Some(Recency::Both),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Recency::Account => "Account created recently",
            Recency::Joined => "Joined the server recently",
            Recency::Both => "Account created or joined recently",
        }
    }

    fn matches(self, member: &MemberSnapshot, cutoff: DateTime<Utc>) -> bool {
        let new_account = member.account_created >= cutoff;
        let new_member = member.joined_at.is_some_and(|joined| joined >= cutoff);
        match self {
            Recency::Account => new_account,
            Recency::Joined => new_member,
            Recency::Both => new_account || new_member,
        }
    }
}

/// Matching members, newest account first.
fn recent_members(
    members: Vec<MemberSnapshot>,
    recency: Recency,
    cutoff: DateTime<Utc>,
    include_bots: bool,
) -> Vec<MemberSnapshot> {
    let mut found: Vec<MemberSnapshot> = members
        .into_iter()
        .filter(|member| include_bots || !member.is_bot)
        .filter(|member| recency.matches(member, cutoff))
        .collect();
    found.sort_by(|a, b| b.account_created.cmp(&a.account_created));
    found
}

fn member_line(member: &MemberSnapshot) -> String {
    let joined = member
        .joined_at
        .map(|at| format!("<t:{}:R>", at.timestamp()))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "<@{}> · created <t:{}:R> · joined {joined}",
        member.user_id,
        member.account_created.timestamp()
    )
}

#[async_trait]
impl CommandAction for RecentAccounts {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
        let Some(guild_id) = ctx.invocation.guild_id else {
            ctx.reply(Reply::text("❌ This command only works inside a server.").ephemeral())
                .await?;
            return Ok(());
        };
        let filter = ctx.invocation.string_option("filter").unwrap_or("both");
        let Some(recency) = Recency::parse(filter) else {
            ctx.reply(
                Reply::text("❌ The filter must be `account`, `joined` or `both`.").ephemeral(),
            )
            .await?;
            return Ok(());
        };
        let days = ctx
            .invocation
            .integer_option("days")
            .unwrap_or(DEFAULT_DAYS)
            .clamp(1, MAX_DAYS);
        let include_bots = ctx.invocation.bool_option("include-bots").unwrap_or(false);

        // Member listing pages through the whole guild.
        ctx.defer(true).await?;

        let moderation = Arc::clone(&ctx.data.moderation);
        let cutoff = Utc::now() - Duration::days(days);
        let found = recent_members(
            moderation.list_members(guild_id).await?,
            recency,
            cutoff,
            include_bots,
        );
        info!(guild_id, days, filter, found = found.len(), "Recent accounts listed");

        let period = format!("Last {days} day(s)");
        let embed = if found.is_empty() {
            Embed::new()
                .title("🔍 No recent accounts")
                .color(EmbedColor::Warning)
                .description("No members match this filter.")
                .field("🔎 Filter", recency.label(), true)
                .field("📅 Period", period, true)
        } else {
            let mut lines: Vec<String> = found.iter().take(MAX_LISTED).map(member_line).collect();
            if found.len() > MAX_LISTED {
                lines.push(format!("…and {} more", found.len() - MAX_LISTED));
            }
            Embed::new()
                .title("🆕 Recent accounts")
                .color(EmbedColor::Info)
                .field("🔎 Filter", recency.label(), true)
                .field("📅 Period", period, true)
                .field("👥 Found", found.len().to_string(), true)
                .field("Members", lines.join("\n"), false)
                .timestamp_now()
        };

        ctx.edit_reply(Reply::embed(embed)).await?;
        Ok(())
    }
}
