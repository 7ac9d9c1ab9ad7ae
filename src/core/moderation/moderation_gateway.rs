// Guild moderation port.
//
// Member lookups and removals needed by the moderation commands, with the
// hierarchy rules that decide whether a target may be acted on. The serenity
// adapter implements the port; the rules stay here with no Discord types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation is not available until the gateway is ready")]
    Unavailable,

    #[error("Discord rejected the request: {0}")]
    Platform(String),
}

// ============================================================================
// MODELS
// ============================================================================

/// What the hierarchy rules need to know about a guild member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub user_id: u64,
    pub display_name: String,
    pub is_bot: bool,
    /// Position of the member's highest role; 0 means only @everyone.
    pub top_role_position: u16,
    pub account_created: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Why a target was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRefusal {
    SelfTarget,
    BotTarget,
    OwnerTarget,
    OutranksCaller,
    OutranksBot,
}

impl TargetRefusal {
    pub fn message(self) -> &'static str {
        match self {
            TargetRefusal::SelfTarget => "You cannot use this command on yourself!",
            TargetRefusal::BotTarget => "You cannot use this command on bots!",
            TargetRefusal::OwnerTarget => "You cannot use this command on the server owner!",
            TargetRefusal::OutranksCaller => {
                "You cannot use this command on someone with a role equal to or higher than yours!"
            }
            TargetRefusal::OutranksBot => {
                "I cannot act on someone with a role equal to or higher than mine!"
            }
        }
    }
}

/// Hierarchy rules for acting on `target`.
///
/// The guild owner outranks everybody, so an owner caller passes the
/// caller-role check regardless of positions.
pub fn check_target(
    caller: &MemberSnapshot,
    target: &MemberSnapshot,
    bot: &MemberSnapshot,
    owner_id: u64,
) -> Result<(), TargetRefusal> {
    if target.user_id == caller.user_id {
        return Err(TargetRefusal::SelfTarget);
    }
    if target.is_bot {
        return Err(TargetRefusal::BotTarget);
    }
    if target.user_id == owner_id {
        return Err(TargetRefusal::OwnerTarget);
    }
    if caller.user_id != owner_id && target.top_role_position >= caller.top_role_position {
        return Err(TargetRefusal::OutranksCaller);
    }
    if target.top_role_position >= bot.top_role_position {
        return Err(TargetRefusal::OutranksBot);
    }
    Ok(())
}

// ============================================================================
// PORT
// ============================================================================

#[async_trait]
pub trait ModerationGateway: Send + Sync {
    /// Look up a member; `Ok(None)` when the user is not in the guild.
    async fn member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<MemberSnapshot>, ModerationError>;

    /// The bot's own membership in the guild.
    async fn bot_member(&self, guild_id: u64) -> Result<MemberSnapshot, ModerationError>;

    async fn guild_owner(&self, guild_id: u64) -> Result<u64, ModerationError>;

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<(), ModerationError>;

    /// Every member of the guild, in no particular order.
    async fn list_members(&self, guild_id: u64) -> Result<Vec<MemberSnapshot>, ModerationError>;
}

/// Gateway used before a platform connection exists.
pub struct DetachedModeration;

#[async_trait]
impl ModerationGateway for DetachedModeration {
    async fn member(&self, _: u64, _: u64) -> Result<Option<MemberSnapshot>, ModerationError> {
        Err(ModerationError::Unavailable)
    }

    async fn bot_member(&self, _: u64) -> Result<MemberSnapshot, ModerationError> {
        Err(ModerationError::Unavailable)
    }

    async fn guild_owner(&self, _: u64) -> Result<u64, ModerationError> {
        Err(ModerationError::Unavailable)
    }

    async fn kick(&self, _: u64, _: u64, _: &str) -> Result<(), ModerationError> {
        Err(ModerationError::Unavailable)
    }

    async fn list_members(&self, _: u64) -> Result<Vec<MemberSnapshot>, ModerationError> {
        Err(ModerationError::Unavailable)
    }
}

// ============================================================================
// TEST DOUBLE
// ============================================================================


#[cfg(test)]
mod tests {
    use super::testing::member;
    use super::*;

    fn bot(position: u16) -> MemberSnapshot {
        MemberSnapshot {
            is_bot: true,
            ..member(9999, position)
        }
    }

    #[test]
    fn moderator_above_target_may_act() {
        assert_eq!(check_target(&member(1, 5), &member(2, 3), &bot(10), 100), Ok(()));
    }

    #[test]
    fn refuses_self_bots_and_owner() {
        let caller = member(1, 5);
        let mut other_bot = member(3, 1);
        other_bot.is_bot = true;

        assert_eq!(
            check_target(&caller, &member(1, 5), &bot(10), 100),
            Err(TargetRefusal::SelfTarget)
        );
        assert_eq!(
            check_target(&caller, &other_bot, &bot(10), 100),
            Err(TargetRefusal::BotTarget)
        );
        assert_eq!(
            check_target(&caller, &member(100, 0), &bot(10), 100),
            Err(TargetRefusal::OwnerTarget)
        );
    }

    #[test]
    fn equal_role_counts_as_outranking() {
        assert_eq!(
            check_target(&member(1, 5), &member(2, 5), &bot(10), 100),
            Err(TargetRefusal::OutranksCaller)
        );
        assert_eq!(
            check_target(&member(1, 9), &member(2, 5), &bot(5), 100),
            Err(TargetRefusal::OutranksBot)
        );
    }

    #[test]
    fn owner_caller_skips_the_role_comparison() {
        assert_eq!(check_target(&member(100, 0), &member(2, 4), &bot(10), 100), Ok(()));
    }

    #[tokio::test]
    async fn detached_gateway_reports_unavailable() {
        let gateway = DetachedModeration;
        assert!(matches!(
            gateway.kick(1, 2, "x").await,
            Err(ModerationError::Unavailable)
        ));
    }
}
