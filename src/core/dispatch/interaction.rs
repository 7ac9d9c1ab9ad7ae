// Inbound interaction model and the reply protocol.
//
// The router and the handlers only ever see these types. The serenity adapter
// fills an `Invocation` from a `CommandInteraction` and supplies a
// `ReplyTransport` that actually talks to Discord.

use crate::core::embeds::Embed;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

// ============================================================================
// INVOCATION DATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: u64,
    pub name: String,
}

/// Permission identifiers a caller holds in the guild the command came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    granted: BTreeSet<String>,
}

impl PermissionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has(&self, permission: &str) -> bool {
        // Administrator implies every other permission, same as Discord.
        self.granted.contains(permission) || self.granted.contains("Administrator")
    }

    /// Required permissions the holder lacks, in declaration order.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|permission| !self.has(permission))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    User(u64),
}

/// Everything a handler may read about the command it is answering.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command_name: String,
    pub subcommand: Option<String>,
    pub caller: Caller,
    pub guild_id: Option<u64>,
    pub guild_name: Option<String>,
    /// `None` outside a guild (direct messages), where no permission context exists.
    pub permissions: Option<PermissionSet>,
    pub options: HashMap<String, OptionValue>,
}

impl Invocation {
    pub fn new(command_name: impl Into<String>, caller: Caller) -> Self {
        Self {
            command_name: command_name.into(),
            subcommand: None,
            caller,
            guild_id: None,
            guild_name: None,
            permissions: None,
            options: HashMap::new(),
        }
    }

    pub fn in_guild(mut self, guild_id: u64, permissions: PermissionSet) -> Self {
        self.guild_id = Some(guild_id);
        self.permissions = Some(permissions);
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn string_option(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn user_option(&self, name: &str) -> Option<u64> {
        match self.options.get(name) {
            Some(OptionValue::User(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn integer_option(&self, name: &str) -> Option<i64> {
        match self.options.get(name) {
            Some(OptionValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool_option(&self, name: &str) -> Option<bool> {
        match self.options.get(name) {
            Some(OptionValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }
}

// ============================================================================
// REPLIES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub ephemeral: bool,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("the interaction was already answered")]
    AlreadyResponded,

    #[error("the interaction has not been answered yet")]
    NotResponded,

    #[error("reply transport failed: {0}")]
    Transport(String),
}

/// Raw sending capability provided by the platform adapter.
///
/// It does no bookkeeping; [`Responder`] decides which call is legal when.
#[async_trait]
pub trait ReplyTransport: Send + Sync {
    async fn send_reply(&self, reply: &Reply) -> Result<(), ReplyError>;
    async fn send_defer(&self, ephemeral: bool) -> Result<(), ReplyError>;
    async fn send_follow_up(&self, reply: &Reply) -> Result<(), ReplyError>;
    async fn send_edit(&self, reply: &Reply) -> Result<(), ReplyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Pending,
    Replied,
    Deferred,
}

/// Enforces the first-response rule: `reply` or `defer` first, exactly once;
/// `follow_up` and `edit_reply` only after that.
pub struct Responder {
    transport: Box<dyn ReplyTransport>,
    state: ResponseState,
}

impl Responder {
    pub fn new(transport: Box<dyn ReplyTransport>) -> Self {
        Self {
            transport,
            state: ResponseState::Pending,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn has_responded(&self) -> bool {
        self.state != ResponseState::Pending
    }

    pub async fn reply(&mut self, reply: Reply) -> Result<(), ReplyError> {
        if self.has_responded() {
            return Err(ReplyError::AlreadyResponded);
        }
        self.transport.send_reply(&reply).await?;
        self.state = ResponseState::Replied;
        Ok(())
    }

    pub async fn defer(&mut self, ephemeral: bool) -> Result<(), ReplyError> {
        if self.has_responded() {
            return Err(ReplyError::AlreadyResponded);
        }
        self.transport.send_defer(ephemeral).await?;
        self.state = ResponseState::Deferred;
        Ok(())
    }

    pub async fn follow_up(&mut self, reply: Reply) -> Result<(), ReplyError> {
        if !self.has_responded() {
            return Err(ReplyError::NotResponded);
        }
        self.transport.send_follow_up(&reply).await
    }

    pub async fn edit_reply(&mut self, reply: Reply) -> Result<(), ReplyError> {
        if !self.has_responded() {
            return Err(ReplyError::NotResponded);
        }
        self.transport.send_edit(&reply).await
    }
}

// ============================================================================
// INBOUND SHAPES
// ============================================================================

/// A command invocation together with the means to answer it.
pub struct CommandInteraction {
    pub invocation: Invocation,
    pub responder: Responder,
}

impl CommandInteraction {
    pub fn new(invocation: Invocation, transport: Box<dyn ReplyTransport>) -> Self {
        Self {
            invocation,
            responder: Responder::new(transport),
        }
    }
}

/// What the gateway hands to the router. Only `Command` is routed.
pub enum InboundInteraction<'a> {
    Command(&'a mut CommandInteraction),
    Other { kind: String },
}

// ============================================================================
// TEST TRANSPORT
// ============================================================================


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn permission_set_requires_every_declared_permission() {
        let only_a = PermissionSet::new(["A"]);
        let both = PermissionSet::new(["A", "B"]);

        assert_eq!(only_a.missing(&required(&["A", "B"])), vec!["B"]);
        assert!(both.missing(&required(&["A", "B"])).is_empty());
    }

    #[test]
    fn administrator_satisfies_everything() {
        let admin = PermissionSet::new(["Administrator"]);
        assert!(admin.missing(&required(&["KickMembers", "BanMembers"])).is_empty());
    }

    #[tokio::test]
    async fn first_response_is_exclusive() {
        let transport = RecordingTransport::default();
        let mut responder = Responder::new(Box::new(transport.clone()));

        responder.reply(Reply::text("hi")).await.unwrap();
        assert!(matches!(
            responder.defer(false).await,
            Err(ReplyError::AlreadyResponded)
        ));
        assert!(matches!(
            responder.reply(Reply::text("again")).await,
            Err(ReplyError::AlreadyResponded)
        ));
        assert_eq!(transport.log().len(), 1);
    }

    #[tokio::test]
    async fn follow_up_and_edit_need_a_first_response() {
        let transport = RecordingTransport::default();
        let mut responder = Responder::new(Box::new(transport.clone()));

        assert!(matches!(
            responder.follow_up(Reply::text("x")).await,
            Err(ReplyError::NotResponded)
        ));
        assert!(matches!(
            responder.edit_reply(Reply::text("x")).await,
            Err(ReplyError::NotResponded)
        ));

        responder.defer(true).await.unwrap();
        assert_eq!(responder.state(), ResponseState::Deferred);
        responder.edit_reply(Reply::text("done")).await.unwrap();
        responder.follow_up(Reply::text("more")).await.unwrap();

        assert_eq!(
            transport.log(),
            vec![
                Sent::Defer { ephemeral: true },
                Sent::Edit(Reply::text("done")),
                Sent::FollowUp(Reply::text("more")),
            ]
        );
    }

    #[test]
    fn typed_option_accessors() {
        let invocation = Invocation::new(
            "kick",
            Caller {
                id: 1,
                name: "mod".into(),
            },
        )
        .with_option("target", OptionValue::User(42))
        .with_option("reason", OptionValue::String("spam".into()))
        .with_option("days", OptionValue::Integer(7))
        .with_option("include-bots", OptionValue::Boolean(true));

        assert_eq!(invocation.user_option("target"), Some(42));
        assert_eq!(invocation.string_option("reason"), Some("spam"));
        assert_eq!(invocation.string_option("target"), None);
        assert_eq!(invocation.integer_option("days"), Some(7));
        assert_eq!(invocation.bool_option("include-bots"), Some(true));
        assert_eq!(invocation.bool_option("days"), None);
    }
}
