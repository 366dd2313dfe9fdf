// ABOUTME: Platform-agnostic core of the Pépito relay: feed ingestion and fan-out delivery
// ABOUTME: Provides the registry, stream client, translator, dispatcher, and host-platform traits

pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod feed;
pub mod lifecycle;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod relay;
pub mod traits;
pub mod translate;

pub use context::AppContext;
pub use dispatch::{broadcast, dispatch, DispatchReport};
pub use feed::{ConnectionState, FeedClient, RawEvent, ReconnectPolicy};
pub use registry::{ChannelId, Registry, RegistryEntry, SetOutcome, SharedRegistry, TenantId};
pub use translate::{Notification, Translator};

// Re-export core traits for convenient access
pub use traits::{ChatChannel, ChatPlatform, Embed, EmbedFooter, MessageContent, Tenant};
