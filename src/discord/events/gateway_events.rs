// Event actions bound from `handlers/events/*.json`.

use crate::core::events::BotEvent;
use crate::core::handlers::{EventAction, EventContext, HandlerError};
use crate::core::storage::Row;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

/// Durable table that keeps one row per member join.
pub const MEMBER_JOINS_TABLE: &str = "member_joins";

/// Logs the connection summary once the gateway is ready.
pub struct ReadyLog;

#[async_trait]
impl EventAction for ReadyLog {
    async fn execute(&self, ctx: &EventContext<'_>) -> Result<(), HandlerError> {
        if let BotEvent::Ready {
            bot_name,
            guild_count,
            user_count,
        } = ctx.event
        {
            info!(
                bot = %bot_name,
                guilds = guild_count,
                users = user_count,
                started_at = %ctx.data.started_at.to_rfc3339(),
                "Bot is online"
            );
        }
        Ok(())
    }
}

/// Records every member join: a line in the cache store's temp log and, when
/// the durable store is connected, a `member_joins` row.
pub struct MemberJoinLog;

#[async_trait]
impl EventAction for MemberJoinLog {
    async fn execute(&self, ctx: &EventContext<'_>) -> Result<(), HandlerError> {
        let BotEvent::MemberJoin {
            guild_id,
            user_id,
            user_name,
        } = ctx.event
        else {
            return Ok(());
        };

        if let Some(durable) = ctx.data.durable.as_ref().filter(|d| d.is_connected()) {
            let mut row = Row::new();
            row.insert("guild_id".into(), json!(guild_id));
            row.insert("user_id".into(), json!(user_id));
            row.insert("user_name".into(), json!(user_name));
            // The temp log still gets the line when the remote write fails.
            if let Err(e) = durable.insert(MEMBER_JOINS_TABLE, vec![row]).await {
                warn!(guild_id, user_id, error = %e, "Join not stored durably");
            }
        }

        let Some(cache) = &ctx.data.cache else {
            debug!(guild_id, user_id, "No cache store, join not recorded");
            return Ok(());
        };

        cache
            .append_log(
                "info",
                &format!("{user_name} joined guild {guild_id}"),
                Some(&json!({ "guild_id": guild_id, "user_id": user_id })),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handlers::Data;
    use crate::core::storage::testing::MemoryStore;
    use crate::core::storage::{CacheStore, DurableStore, RecordStore, SelectQuery};
    use crate::infra::storage::SqliteCacheStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn join() -> BotEvent {
        BotEvent::MemberJoin {
            guild_id: 5,
            user_id: 6,
            user_name: "newcomer".into(),
        }
    }

    #[tokio::test]
    async fn join_lands_in_both_stores() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(SqliteCacheStore::open(&dir.path().join("cache.db")).await.unwrap());
        let durable = Arc::new(MemoryStore::connected());
        let data = Data::detached()
            .with_cache(cache.clone())
            .with_durable(durable.clone());

        let event = join();
        MemberJoinLog
            .execute(&EventContext {
                event: &event,
                data: &data,
            })
            .await
            .unwrap();

        let rows = durable
            .select(MEMBER_JOINS_TABLE, &SelectQuery::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_name"], json!("newcomer"));
        assert_eq!(cache.stats().await.unwrap().log_lines, 1);
    }

    #[tokio::test]
    async fn disconnected_durable_store_is_skipped() {
        let durable = Arc::new(MemoryStore::default());
        let data = Data::detached().with_durable(durable.clone());

        let event = join();
        MemberJoinLog
            .execute(&EventContext {
                event: &event,
                data: &data,
            })
            .await
            .unwrap();

        assert!(!durable.is_connected());
        assert!(durable.rows(MEMBER_JOINS_TABLE).is_empty());
    }
}
