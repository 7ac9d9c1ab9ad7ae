// The core module holds everything that does not know about Discord:
// registries, dispatch, cooldowns, the event bus, plugin modules and the
// storage ports. Each concern gets its own submodule.

#[path = "client/bot_client.rs"]
pub mod client;

#[path = "cooldowns/cooldown_tracker.rs"]
pub mod cooldowns;

#[path = "dispatch/mod.rs"]
pub mod dispatch;

#[path = "embeds/embed_builder.rs"]
pub mod embeds;

#[path = "events/event_bus.rs"]
pub mod events;

#[path = "handlers/mod.rs"]
pub mod handlers;

#[path = "moderation/moderation_gateway.rs"]
pub mod moderation;

#[path = "plugins/mod.rs"]
pub mod plugins;

#[path = "storage/mod.rs"]
pub mod storage;
