// Handler descriptors: the metadata every command or event carries, plus the
// action that runs when it fires.

use super::handler_context::{CommandContext, EventContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error type handlers return. Same shape the rest of the bot uses for
/// command errors, so `?` works on anything that implements `Error`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Command,
    Event,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Command => write!(f, "command"),
            HandlerKind::Event => write!(f, "event"),
        }
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

#[async_trait]
pub trait CommandAction: Send + Sync {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait EventAction: Send + Sync {
    async fn execute(&self, ctx: &EventContext<'_>) -> Result<(), HandlerError>;
}

// ============================================================================
// METADATA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOptionKind {
    String,
    Integer,
    Number,
    Boolean,
    User,
}

/// A slash-command parameter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandOptionSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CommandOptionKind,
    #[serde(default)]
    pub required: bool,
}

fn default_enabled() -> bool {
    true
}

/// Source an event handler listens to when its manifest names none.
pub const DEFAULT_EVENT_TYPE: &str = "discord";

/// Everything about a handler except its action.
///
/// Decoded from manifest JSON (after shape validation) or built in code with
/// the builder methods below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandlerMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Milliseconds. `cooldownMs` is accepted as an alternate key.
    #[serde(default, alias = "cooldownMs")]
    pub cooldown: Option<u64>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub once: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub options: Vec<CommandOptionSpec>,
    /// Event source tag (`discord`, `custom`, ...). Ignored for commands.
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
}

impl HandlerMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: None,
            cooldown: None,
            permissions: Vec::new(),
            aliases: Vec::new(),
            once: false,
            enabled: true,
            usage: None,
            examples: Vec::new(),
            options: Vec::new(),
            event_type: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown = Some(cooldown_ms);
        self
    }

    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Configured cooldown, or `None` when absent or zero.
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or("general")
    }

    pub fn event_type_or_default(&self) -> &str {
        self.event_type.as_deref().unwrap_or(DEFAULT_EVENT_TYPE)
    }

    pub fn usage_or_default(&self) -> String {
        self.usage
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name))
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// A named unit of behaviour: metadata plus the action to run.
pub struct HandlerDescriptor<A: ?Sized> {
    pub meta: HandlerMeta,
    pub action: Arc<A>,
}

pub type CommandDescriptor = HandlerDescriptor<dyn CommandAction>;
pub type EventDescriptor = HandlerDescriptor<dyn EventAction>;

impl<A: ?Sized> HandlerDescriptor<A> {
    pub fn new(meta: HandlerMeta, action: Arc<A>) -> Self {
        Self { meta, action }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

impl<A: ?Sized> Clone for HandlerDescriptor<A> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<A: ?Sized> fmt::Debug for HandlerDescriptor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Summary row for a registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub category: String,
    pub cooldown_ms: u64,
    pub permissions: Vec<String>,
    pub usage: String,
    pub examples: Vec<String>,
}

impl From<&HandlerMeta> for CommandInfo {
    fn from(meta: &HandlerMeta) -> Self {
        Self {
            name: meta.name.clone(),
            description: meta.description.clone(),
            category: meta.category_or_default().to_string(),
            cooldown_ms: meta.cooldown.unwrap_or(0),
            permissions: meta.permissions.clone(),
            usage: meta.usage_or_default(),
            examples: meta.examples.clone(),
        }
    }
}

/// Summary row for a registered event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub name: String,
    pub description: String,
    pub event_type: String,
    pub once: bool,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_decodes_with_defaults() {
        let meta: HandlerMeta = serde_json::from_value(json!({ "name": "ping" })).unwrap();

        assert_eq!(meta.name, "ping");
        assert!(meta.enabled);
        assert!(!meta.once);
        assert_eq!(meta.cooldown(), None);
        assert_eq!(meta.category_or_default(), "general");
        assert_eq!(meta.usage_or_default(), "/ping");
        assert_eq!(meta.event_type_or_default(), "discord");
    }

    #[test]
    fn event_type_comes_from_the_type_key() {
        let meta: HandlerMeta =
            serde_json::from_value(json!({ "name": "botReady", "type": "custom" })).unwrap();
        assert_eq!(meta.event_type_or_default(), "custom");
    }

    #[test]
    fn cooldown_ms_alias_is_accepted() {
        let meta: HandlerMeta =
            serde_json::from_value(json!({ "name": "kick", "cooldownMs": 5000 })).unwrap();
        assert_eq!(meta.cooldown(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn zero_cooldown_means_none() {
        assert_eq!(HandlerMeta::named("x").cooldown_ms(0).cooldown(), None);
    }

    #[test]
    fn command_info_fills_defaults() {
        let info = CommandInfo::from(&HandlerMeta::named("kick").permissions(["KickMembers"]));
        assert_eq!(info.category, "general");
        assert_eq!(info.cooldown_ms, 0);
        assert_eq!(info.usage, "/kick");
        assert_eq!(info.permissions, vec!["KickMembers".to_string()]);
    }
}
