// What an action can reach while it runs.

use super::handler_models::HandlerError;
use super::registry::Registry;
use crate::core::cooldowns::CooldownTracker;
use crate::core::dispatch::{Invocation, Reply, ReplyError, Responder};
use crate::core::events::BotEvent;
use crate::core::moderation::ModerationGateway;
use crate::core::plugins::ModuleLoader;
use crate::core::storage::{CacheStore, DurableStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared services handed to every action.
///
/// Must not hold the registry: event shims capture `Arc<Data>` and the
/// registry owns the shims.
pub struct Data {
    pub started_at: DateTime<Utc>,
    pub moderation: Arc<dyn ModerationGateway>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub durable: Option<Arc<dyn DurableStore>>,
}

impl Data {
    pub fn new(moderation: Arc<dyn ModerationGateway>) -> Self {
        Self {
            started_at: Utc::now(),
            moderation,
            cache: None,
            durable: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_durable(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Seconds since the bot process started.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    #[cfg(test)]
    pub fn detached() -> Self {
        Self::new(Arc::new(crate::core::moderation::DetachedModeration))
    }
}

/// Runtime controls the router lends to administrative commands.
#[derive(Clone, Copy)]
pub struct Controls<'a> {
    pub cooldowns: &'a CooldownTracker,
    pub modules: &'a ModuleLoader,
}

/// Context for one command invocation.
pub struct CommandContext<'a> {
    pub invocation: &'a Invocation,
    pub data: &'a Data,
    pub registry: &'a Registry,
    controls: Option<Controls<'a>>,
    responder: &'a mut Responder,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        invocation: &'a Invocation,
        responder: &'a mut Responder,
        data: &'a Data,
        registry: &'a Registry,
    ) -> Self {
        Self {
            invocation,
            data,
            registry,
            controls: None,
            responder,
        }
    }

    pub fn with_controls(mut self, controls: Controls<'a>) -> Self {
        self.controls = Some(controls);
        self
    }

    /// Cooldown ledger and module loader. Only routed invocations carry them.
    pub fn controls(&self) -> Result<Controls<'a>, HandlerError> {
        self.controls
            .ok_or_else(|| "runtime controls are not available here".into())
    }

    pub async fn reply(&mut self, reply: Reply) -> Result<(), ReplyError> {
        self.responder.reply(reply).await
    }

    pub async fn defer(&mut self, ephemeral: bool) -> Result<(), ReplyError> {
        self.responder.defer(ephemeral).await
    }

    pub async fn follow_up(&mut self, reply: Reply) -> Result<(), ReplyError> {
        self.responder.follow_up(reply).await
    }

    pub async fn edit_reply(&mut self, reply: Reply) -> Result<(), ReplyError> {
        self.responder.edit_reply(reply).await
    }

    pub fn has_responded(&self) -> bool {
        self.responder.has_responded()
    }
}

/// Context for one event delivery.
pub struct EventContext<'a> {
    pub event: &'a BotEvent,
    pub data: &'a Data,
}
