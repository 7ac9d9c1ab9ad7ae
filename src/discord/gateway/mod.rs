pub mod gateway_bridge;
pub mod serenity_moderation;
pub mod serenity_reply;
pub mod slash_commands;

pub use gateway_bridge::{CommandScope, GatewayBridge, SerenityConnection};
pub use serenity_moderation::SerenityModeration;
