// ABOUTME: Host platform implementations for the relay core
// ABOUTME: Discord is the only host; re-exported here for convenient access

pub mod discord;

pub use discord::{DiscordChannel, DiscordPlatform, GatewayBridge, PlatformEvent};
