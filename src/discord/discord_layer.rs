// Discord layer - built-in actions and the serenity adapter.

#[path = "builtin_catalog.rs"]
pub mod catalog;

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "events/mod.rs"]
pub mod events;

#[path = "gateway/mod.rs"]
pub mod gateway;

#[path = "plugins/mod.rs"]
pub mod plugins;

pub use catalog::builtin_catalog;
