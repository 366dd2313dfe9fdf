// ABOUTME: Discord text channel wrapped as a ChatChannel
// ABOUTME: Sends through serenity's shared Http client, which handles auth and rate limits

use anyhow::{Context, Result};
use async_trait::async_trait;
use pepito_core::traits::{ChatChannel, MessageContent};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use std::sync::Arc;

use super::builders::create_message;

#[derive(Clone)]
pub struct DiscordChannel {
    channel: ChannelId,
    id: String,
    name: Option<String>,
    http: Arc<Http>,
}

impl std::fmt::Debug for DiscordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl DiscordChannel {
    pub fn new(channel: ChannelId, name: Option<String>, http: Arc<Http>) -> Self {
        Self {
            channel,
            id: channel.to_string(),
            name,
            http,
        }
    }
}

#[async_trait]
impl ChatChannel for DiscordChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn send(&self, content: MessageContent) -> Result<()> {
        self.channel
            .send_message(&self.http, create_message(&content))
            .await
            .with_context(|| format!("Failed to send message to channel {}", self.id))?;
        Ok(())
    }
}
