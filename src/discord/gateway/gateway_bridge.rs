// Serenity event handler: forwards gateway traffic into the bot client.

use super::serenity_moderation::SerenityModeration;
use super::serenity_reply::SerenityReplyTransport;
use super::slash_commands::{create_command, invocation_from};
use crate::core::client::{BotClient, ClientError, GatewayConnection};
use crate::core::dispatch::{CommandInteraction, InboundInteraction};
use crate::core::events::BotEvent;
use async_trait::async_trait;
use serenity::all::{
    Command, Context, CreateCommand, EventHandler, GatewayIntents, GuildId, Interaction, Member,
    Message, Ready, ShardManager, User,
};
use serenity::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Where slash commands are registered on ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Global,
    /// Guild-scoped registration shows up instantly, handy while developing.
    Guild(u64),
}

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

pub struct GatewayBridge {
    client: Arc<BotClient>,
    moderation: Arc<SerenityModeration>,
    scope: CommandScope,
}

impl GatewayBridge {
    pub fn new(
        client: Arc<BotClient>,
        moderation: Arc<SerenityModeration>,
        scope: CommandScope,
    ) -> Self {
        Self {
            client,
            moderation,
            scope,
        }
    }

    fn slash_commands(&self) -> Vec<CreateCommand> {
        self.client
            .registry()
            .commands()
            .all()
            .iter()
            .filter(|descriptor| descriptor.meta.enabled)
            .map(|descriptor| create_command(&descriptor.meta))
            .collect()
    }

    async fn register_commands(&self, ctx: &Context) {
        let commands = self.slash_commands();
        let count = commands.len();
        let result = match self.scope {
            CommandScope::Global => Command::set_global_commands(ctx, commands)
                .await
                .map(|_| ()),
            CommandScope::Guild(id) => GuildId::new(id)
                .set_commands(ctx, commands)
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => info!(count, scope = ?self.scope, "Slash commands registered"),
            Err(e) => error!(error = %e, scope = ?self.scope, "Slash command registration failed"),
        }
    }
}

#[async_trait]
impl EventHandler for GatewayBridge {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.moderation
            .attach(Arc::clone(&ctx.http), ready.user.id.get());
        self.register_commands(&ctx).await;

        self.client
            .emit(BotEvent::Ready {
                bot_name: ready.user.name.clone(),
                guild_count: ready.guilds.len(),
                user_count: ctx.cache.user_count(),
            })
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                let guild_name = command
                    .guild_id
                    .and_then(|id| ctx.cache.guild(id).map(|guild| guild.name.clone()));
                let invocation = invocation_from(&command, guild_name);
                let transport = SerenityReplyTransport::new(Arc::clone(&ctx.http), command);
                let mut inbound = CommandInteraction::new(invocation, Box::new(transport));

                let outcome = self
                    .client
                    .handle_interaction(InboundInteraction::Command(&mut inbound))
                    .await;
                debug!(?outcome, "Command interaction handled");
            }
            other => {
                let kind = format!("{:?}", other.kind());
                self.client
                    .handle_interaction(InboundInteraction::Other { kind })
                    .await;
            }
        }
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        self.client
            .emit(BotEvent::MemberJoin {
                guild_id: new_member.guild_id.get(),
                user_id: new_member.user.id.get(),
                user_name: new_member.user.name.clone(),
            })
            .await;
    }

    async fn guild_member_removal(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        self.client
            .emit(BotEvent::MemberLeave {
                guild_id: guild_id.get(),
                user_id: user.id.get(),
                user_name: user.name,
            })
            .await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        self.client
            .emit(BotEvent::MessageCreate {
                guild_id: msg.guild_id.map(|id| id.get()),
                channel_id: msg.channel_id.get(),
                author_id: msg.author.id.get(),
                content: msg.content,
            })
            .await;
    }
}

/// The serenity client behind the `GatewayConnection` port.
pub struct SerenityConnection {
    client: Mutex<Option<Client>>,
    shards: Arc<ShardManager>,
}

impl SerenityConnection {
    pub async fn connect(token: &str, bridge: GatewayBridge) -> Result<Self, ClientError> {
        let client = Client::builder(token, intents())
            .event_handler(bridge)
            .await
            .map_err(|e| ClientError::Gateway(e.to_string()))?;

        Ok(Self {
            shards: Arc::clone(&client.shard_manager),
            client: Mutex::new(Some(client)),
        })
    }
}

#[async_trait]
impl GatewayConnection for SerenityConnection {
    async fn run(&self) -> Result<(), ClientError> {
        let mut client = self
            .client
            .lock()
            .await
            .take()
            .ok_or_else(|| ClientError::Gateway("gateway client already consumed".into()))?;

        client
            .start()
            .await
            .map_err(|e| ClientError::Gateway(e.to_string()))
    }

    async fn shutdown(&self) {
        info!("Closing gateway shards");
        self.shards.shutdown_all().await;
    }
}
