// ABOUTME: Host-platform traits the core delivers through (tenant directory + channel sending)
// ABOUTME: Also defines the platform-neutral message content types (plain text, embeds)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::registry::TenantId;

// =============================================================================
// Message Content Types
// =============================================================================

/// Footer line of an embed (text plus optional icon)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: Option<String>,
}

impl EmbedFooter {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            icon_url: None,
        }
    }

    pub fn with_icon(text: impl Into<String>, icon_url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            icon_url: Some(icon_url.into()),
        }
    }
}

/// A rich card message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    /// RGB colour, e.g. 0x0099ff
    pub color: Option<u32>,
    pub image_url: Option<String>,
    pub footer: Option<EmbedFooter>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn footer(mut self, footer: EmbedFooter) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Content that can be sent to a chat channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text message
    Plain(String),
    /// Rich embed card
    Embed(Embed),
}

impl MessageContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    /// Title of the embed, or the text itself for plain messages
    pub fn headline(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Embed(embed) => &embed.title,
        }
    }
}

impl From<Embed> for MessageContent {
    fn from(embed: Embed) -> Self {
        Self::Embed(embed)
    }
}

// =============================================================================
// Tenant Identity
// =============================================================================

/// A chat workspace/server the system has been added to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tenant {
    /// Stable identifier (Discord guild snowflake)
    pub id: TenantId,
    /// Display name; mutable, never used as a key
    pub name: String,
    /// User id of the tenant's owning administrator, when known
    pub owner_id: Option<String>,
}

impl Tenant {
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

// =============================================================================
// Platform Traits
// =============================================================================

/// A channel that can receive messages
#[async_trait]
pub trait ChatChannel: Send + Sync + Debug + Clone {
    /// Unique identifier for this channel
    fn id(&self) -> &str;

    /// Human-readable name of the channel, if available
    fn name(&self) -> Option<String>;

    /// Send a message to this channel
    async fn send(&self, content: MessageContent) -> Result<()>;
}

/// The host chat platform as seen by the core: a directory of tenants plus
/// the ability to resolve channels that can be sent to.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The channel type for this platform
    type Channel: ChatChannel;

    /// Platform identifier (e.g., "discord")
    fn platform_id(&self) -> &'static str;

    /// Resolve a channel by ID. `None` means stale or inaccessible.
    async fn get_channel(&self, id: &str) -> Option<Self::Channel>;

    /// All tenants the system is currently a member of
    async fn tenants(&self) -> Vec<Tenant>;

    /// A text channel inside the tenant where the system can both view and send,
    /// preferring the tenant's designated system channel
    async fn default_channel(&self, tenant_id: &TenantId) -> Option<Self::Channel>;
}
