use crate::core::dispatch::{Reply, ReplyError, ReplyTransport};
use crate::core::embeds::Embed;
use async_trait::async_trait;
use serenity::all::{
    CommandInteraction, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, EditInteractionResponse,
    Http, Timestamp,
};
use std::sync::Arc;

fn transport_error(e: serenity::Error) -> ReplyError {
    ReplyError::Transport(e.to_string())
}

pub fn to_create_embed(embed: &Embed) -> CreateEmbed {
    let mut out = CreateEmbed::new();
    if let Some(title) = &embed.title {
        out = out.title(title);
    }
    if let Some(description) = &embed.description {
        out = out.description(description);
    }
    if let Some(color) = embed.color {
        out = out.color(color);
    }
    for field in &embed.fields {
        out = out.field(&field.name, &field.value, field.inline);
    }
    if let Some(footer) = &embed.footer {
        out = out.footer(CreateEmbedFooter::new(footer));
    }
    if let Some(timestamp) = embed
        .timestamp
        .and_then(|ts| Timestamp::from_unix_timestamp(ts.timestamp()).ok())
    {
        out = out.timestamp(timestamp);
    }
    if let Some(url) = &embed.url {
        out = out.url(url);
    }
    if let Some(thumbnail) = &embed.thumbnail {
        out = out.thumbnail(thumbnail);
    }
    out
}

fn embeds(reply: &Reply) -> Vec<CreateEmbed> {
    reply.embeds.iter().map(to_create_embed).collect()
}

/// Answers one slash-command interaction over Discord's HTTP API.
pub struct SerenityReplyTransport {
    http: Arc<Http>,
    interaction: CommandInteraction,
}

impl SerenityReplyTransport {
    pub fn new(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self { http, interaction }
    }
}

#[async_trait]
impl ReplyTransport for SerenityReplyTransport {
    async fn send_reply(&self, reply: &Reply) -> Result<(), ReplyError> {
        let mut message = CreateInteractionResponseMessage::new()
            .embeds(embeds(reply))
            .ephemeral(reply.ephemeral);
        if let Some(content) = &reply.content {
            message = message.content(content);
        }

        self.interaction
            .create_response(&*self.http, CreateInteractionResponse::Message(message))
            .await
            .map_err(transport_error)
    }

    async fn send_defer(&self, ephemeral: bool) -> Result<(), ReplyError> {
        let message = CreateInteractionResponseMessage::new().ephemeral(ephemeral);
        self.interaction
            .create_response(&*self.http, CreateInteractionResponse::Defer(message))
            .await
            .map_err(transport_error)
    }

    async fn send_follow_up(&self, reply: &Reply) -> Result<(), ReplyError> {
        let mut followup = CreateInteractionResponseFollowup::new()
            .embeds(embeds(reply))
            .ephemeral(reply.ephemeral);
        if let Some(content) = &reply.content {
            followup = followup.content(content);
        }

        self.interaction
            .create_followup(&*self.http, followup)
            .await
            .map(|_| ())
            .map_err(transport_error)
    }

    async fn send_edit(&self, reply: &Reply) -> Result<(), ReplyError> {
        let mut edit = EditInteractionResponse::new().embeds(embeds(reply));
        if let Some(content) = &reply.content {
            edit = edit.content(content);
        }

        self.interaction
            .edit_response(&*self.http, edit)
            .await
            .map(|_| ())
            .map_err(transport_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embeds::EmbedColor;
    use serde_json::Value;

    #[test]
    fn embed_fields_carry_over() {
        let embed = Embed::new()
            .title("🏓 Pong!")
            .color(EmbedColor::Success)
            .field("Status", "ok", true)
            .footer("Requested by someone");

        let json = serde_json::to_value(to_create_embed(&embed)).unwrap();
        assert_eq!(json["title"], Value::from("🏓 Pong!"));
        assert_eq!(json["color"], Value::from(0x00FF00));
        assert_eq!(json["fields"][0]["name"], Value::from("Status"));
        assert_eq!(json["fields"][0]["inline"], Value::from(true));
        assert_eq!(json["footer"]["text"], Value::from("Requested by someone"));
    }
}
