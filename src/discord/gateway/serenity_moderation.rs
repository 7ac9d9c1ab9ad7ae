use crate::core::moderation::{MemberSnapshot, ModerationError, ModerationGateway};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{GuildId, Http, Member, Role, Timestamp, UserId};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Discord's page size for member listing.
const MEMBER_PAGE: u64 = 1000;

fn platform(e: serenity::Error) -> ModerationError {
    ModerationError::Platform(e.to_string())
}

fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

fn snapshot(member: &Member, roles: &[Role]) -> MemberSnapshot {
    let top_role_position = roles
        .iter()
        .filter(|role| member.roles.contains(&role.id))
        .map(|role| role.position)
        .max()
        .unwrap_or(0);

    MemberSnapshot {
        user_id: member.user.id.get(),
        display_name: member.display_name().to_string(),
        is_bot: member.user.bot,
        top_role_position,
        account_created: to_utc(member.user.id.created_at()),
        joined_at: member.joined_at.map(to_utc),
    }
}

fn is_unknown_member(e: &serenity::Error) -> bool {
    match e {
        // Discord answers an unknown member with 404.
        serenity::Error::Http(http) => http.status_code().map(|s| s.as_u16()) == Some(404),
        _ => false,
    }
}

/// Moderation port over Discord's HTTP API.
///
/// Attached once the gateway reports ready; until then every call is
/// `Unavailable`.
#[derive(Default)]
pub struct SerenityModeration {
    http: OnceLock<Arc<Http>>,
    bot_id: OnceLock<u64>,
}

impl SerenityModeration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, http: Arc<Http>, bot_id: u64) {
        if self.http.set(http).is_ok() {
            debug!(bot_id, "Moderation gateway attached");
        }
        let _ = self.bot_id.set(bot_id);
    }

    fn http(&self) -> Result<&Http, ModerationError> {
        self.http
            .get()
            .map(|http| http.as_ref())
            .ok_or(ModerationError::Unavailable)
    }
}

#[async_trait]
impl ModerationGateway for SerenityModeration {
    async fn member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<MemberSnapshot>, ModerationError> {
        let http = self.http()?;
        let guild_id = GuildId::new(guild_id);
        match http.get_member(guild_id, UserId::new(user_id)).await {
            Ok(member) => {
                let roles = http.get_guild_roles(guild_id).await.map_err(platform)?;
                Ok(Some(snapshot(&member, &roles)))
            }
            Err(e) if is_unknown_member(&e) => Ok(None),
            Err(e) => Err(platform(e)),
        }
    }

    async fn bot_member(&self, guild_id: u64) -> Result<MemberSnapshot, ModerationError> {
        let bot_id = *self.bot_id.get().ok_or(ModerationError::Unavailable)?;
        self.member(guild_id, bot_id)
            .await?
            .ok_or_else(|| ModerationError::Platform("bot is not a member of this guild".into()))
    }

    async fn guild_owner(&self, guild_id: u64) -> Result<u64, ModerationError> {
        let guild = self
            .http()?
            .get_guild(GuildId::new(guild_id))
            .await
            .map_err(platform)?;
        Ok(guild.owner_id.get())
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ModerationError> {
        self.http()?
            .kick_member(GuildId::new(guild_id), UserId::new(user_id), Some(reason))
            .await
            .map_err(platform)
    }

    async fn list_members(&self, guild_id: u64) -> Result<Vec<MemberSnapshot>, ModerationError> {
        let http = self.http()?;
        let guild_id = GuildId::new(guild_id);
        let roles = http.get_guild_roles(guild_id).await.map_err(platform)?;

        let mut members = Vec::new();
        let mut after = None;
        loop {
            let page = http
                .get_guild_members(guild_id, Some(MEMBER_PAGE), after)
                .await
                .map_err(platform)?;
            let full_page = page.len() as u64 == MEMBER_PAGE;
            after = page.last().map(|member| member.user.id.get());
            members.extend(page.iter().map(|member| snapshot(member, &roles)));
            if !full_page {
                break;
            }
        }
        debug!(guild_id = guild_id.get(), count = members.len(), "Guild members listed");
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calls_before_ready_are_unavailable() {
        let moderation = SerenityModeration::new();
        assert!(matches!(
            moderation.member(1, 2).await,
            Err(ModerationError::Unavailable)
        ));
        assert!(matches!(
            moderation.bot_member(1).await,
            Err(ModerationError::Unavailable)
        ));
    }
}
