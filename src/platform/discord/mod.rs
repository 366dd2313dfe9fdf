// ABOUTME: Discord platform on serenity: gateway-fed guild cache plus Http delivery
// ABOUTME: Implements ChatPlatform for the relay and emits tenant/command signals for the handler

pub mod builders;
pub mod channel;
pub mod events;

pub use channel::DiscordChannel;
pub use events::GatewayBridge;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pepito_core::config::DiscordConfig;
use pepito_core::traits::{ChatPlatform, Tenant};
use pepito_core::TenantId;
use serenity::all::{
    ActivityData, Cache, ChannelId, ChannelType, Client, CommandInteraction, GatewayIntents, Guild,
    GuildChannel, GuildId, Http, Permissions, UserId,
};
use std::sync::Arc;

/// Shown under the bot's name in member lists
pub const PRESENCE: &str = "/setchannel to get started";

/// Signals from the host platform, consumed by the event handler
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// Gateway session established, with every tenant it reports (also after a re-identify)
    Ready { tenant_ids: Vec<TenantId> },
    /// The bot was added to a tenant
    TenantJoined(Tenant),
    /// The bot was removed from a tenant (or the tenant was deleted)
    TenantLeft(TenantId),
    TenantRenamed { tenant_id: TenantId, name: String },
    /// A slash command invocation
    Command(Box<CommandInteraction>),
}

/// Discord as seen by the core: channel resolution and the tenant directory
/// are served from serenity's gateway-fed cache, sends go through its Http client.
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl std::fmt::Debug for DiscordPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordPlatform")
            .field("guilds", &self.cache.guild_count())
            .finish()
    }
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    /// Build the serenity client (not yet connected) and the platform view over it
    pub async fn connect(config: &DiscordConfig, bridge: GatewayBridge) -> Result<(Self, Client)> {
        let client = Client::builder(&config.bot_token, GatewayIntents::GUILDS)
            .event_handler(bridge)
            .activity(ActivityData::custom(PRESENCE))
            .await
            .context("Failed to build Discord client")?;
        let platform = Self::new(client.http.clone(), client.cache.clone());
        Ok((platform, client))
    }

    pub fn http(&self) -> &Arc<Http> {
        &self.http
    }

    /// Current directory entry for a guild, with its owner
    pub fn tenant(&self, guild_id: &str) -> Option<Tenant> {
        let guild_id = parse_id(guild_id).map(GuildId::new)?;
        self.cache.guild(guild_id).map(|guild| tenant_of(&guild))
    }

    fn wrap(&self, channel: &GuildChannel) -> DiscordChannel {
        DiscordChannel::new(channel.id, Some(channel.name.clone()), self.http.clone())
    }

    fn bot_id(&self) -> UserId {
        self.cache.current_user().id
    }

    /// Cached text channel the bot can post in. The guild guard never outlives this call.
    fn sendable_channel(&self, channel_id: ChannelId) -> Option<DiscordChannel> {
        let bot_id = self.bot_id();
        self.cache.guilds().into_iter().find_map(|guild_id| {
            let guild = self.cache.guild(guild_id)?;
            let channel = guild.channels.get(&channel_id)?;
            can_post(&guild, bot_id, channel).then(|| self.wrap(channel))
        })
    }

    fn guild_default_channel(&self, guild_id: GuildId) -> Option<DiscordChannel> {
        let bot_id = self.bot_id();
        let guild = self.cache.guild(guild_id)?;
        let sendable: Vec<(ChannelId, u16)> = guild
            .channels
            .values()
            .filter(|channel| can_post(&guild, bot_id, channel))
            .map(|channel| (channel.id, channel.position))
            .collect();
        let chosen = pick_default_channel(guild.system_channel_id, &sendable)?;
        guild.channels.get(&chosen).map(|channel| self.wrap(channel))
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    type Channel = DiscordChannel;

    fn platform_id(&self) -> &'static str {
        "discord"
    }

    async fn get_channel(&self, id: &str) -> Option<DiscordChannel> {
        self.sendable_channel(ChannelId::new(parse_id(id)?))
    }

    async fn tenants(&self) -> Vec<Tenant> {
        let mut tenants: Vec<Tenant> = self
            .cache
            .guilds()
            .into_iter()
            .filter_map(|id| self.cache.guild(id).map(|guild| tenant_of(&guild)))
            .collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        tenants
    }

    async fn default_channel(&self, tenant_id: &TenantId) -> Option<DiscordChannel> {
        self.guild_default_channel(GuildId::new(parse_id(tenant_id.as_str())?))
    }
}

pub fn tenant_of(guild: &Guild) -> Tenant {
    Tenant::new(guild.id.to_string(), guild.name.as_str()).with_owner(guild.owner_id.to_string())
}

/// Snowflakes are non-zero; anything else cannot name a Discord object
fn parse_id(id: &str) -> Option<u64> {
    id.parse::<u64>().ok().filter(|id| *id != 0)
}

pub fn is_text_channel(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Text | ChannelType::News)
}

/// Both view and send are needed to post
pub fn can_send(permissions: Permissions) -> bool {
    permissions.contains(Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES)
}

/// Who may run `/setchannel`
pub fn can_manage(permissions: Permissions) -> bool {
    permissions.intersects(Permissions::ADMINISTRATOR | Permissions::MANAGE_CHANNELS)
}

fn can_post(guild: &Guild, bot_id: UserId, channel: &GuildChannel) -> bool {
    if !is_text_channel(channel.kind) {
        return false;
    }
    let Some(member) = guild.members.get(&bot_id) else {
        tracing::debug!(guild_id = %guild.id, "Own member not cached");
        return false;
    };
    can_send(guild.user_permissions_in(channel, member))
}

/// The system channel if it is usable, otherwise the lowest positioned usable channel
pub fn pick_default_channel(
    system_channel: Option<ChannelId>,
    sendable: &[(ChannelId, u16)],
) -> Option<ChannelId> {
    if let Some(system) = system_channel.filter(|id| sendable.iter().any(|(c, _)| c == id)) {
        return Some(system);
    }
    sendable
        .iter()
        .min_by_key(|(id, position)| (*position, *id))
        .map(|(id, _)| *id)
}
