// ABOUTME: serenity EventHandler that forwards gateway dispatches to the relay as PlatformEvents
// ABOUTME: Also mirrors the shard's connection stage into the gateway ConnectionState watch

use pepito_core::{ConnectionState, TenantId};
use serenity::async_trait;
use serenity::gateway::{ConnectionStage, ShardStageUpdateEvent};
use serenity::model::application::Interaction;
use serenity::model::event::ResumedEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::{Guild, PartialGuild, UnavailableGuild};
use serenity::model::id::GuildId;
use serenity::prelude::{Context, EventHandler};
use tokio::sync::{mpsc, watch};

use super::{tenant_of, PlatformEvent};

/// Bridges serenity callbacks onto the handler's event channel
pub struct GatewayBridge {
    events: mpsc::Sender<PlatformEvent>,
    state: watch::Sender<ConnectionState>,
}

impl GatewayBridge {
    pub fn new(events: mpsc::Sender<PlatformEvent>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { events, state }
    }

    /// Gateway connection state, for health reporting
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn forward(&self, event: PlatformEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Platform event dropped, handler has stopped");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

#[async_trait]
impl EventHandler for GatewayBridge {
    async fn ready(&self, ctx: Context, ready: Ready) {
        ctx.http.set_application_id(ready.application.id);
        self.set_state(ConnectionState::Streaming);
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "Discord session ready"
        );
        self.forward(PlatformEvent::Ready {
            tenant_ids: session_tenants(&ready.guilds),
        })
        .await;
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        self.set_state(ConnectionState::Streaming);
        tracing::info!("Discord session resumed");
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        tracing::debug!(from = ?event.old, to = ?event.new, "Shard stage changed");
        self.set_state(stage_state(event.new));
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, is_new: Option<bool>) {
        // Guilds listed in READY arrive with is_new = Some(false)
        if is_new == Some(true) {
            tracing::info!(guild_id = %guild.id, guild = %guild.name, "Added to guild");
            self.forward(PlatformEvent::TenantJoined(tenant_of(&guild))).await;
        }
    }

    async fn guild_delete(
        &self,
        _ctx: Context,
        incomplete: UnavailableGuild,
        _full: Option<Guild>,
    ) {
        match departure(incomplete.id, incomplete.unavailable) {
            Some(event) => {
                tracing::info!(guild_id = %incomplete.id, "Removed from guild");
                self.forward(event).await;
            }
            None => tracing::warn!(guild_id = %incomplete.id, "Guild became unavailable"),
        }
    }

    async fn guild_update(&self, _ctx: Context, old: Option<Guild>, new: PartialGuild) {
        if old.is_some_and(|old| old.name == new.name) {
            return;
        }
        self.forward(PlatformEvent::TenantRenamed {
            tenant_id: TenantId::from(new.id.to_string()),
            name: new.name,
        })
        .await;
    }

    async fn interaction_create(&self, _ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            self.forward(PlatformEvent::Command(Box::new(command))).await;
        }
    }
}

/// Every guild a fresh session reports membership of, available or not
pub fn session_tenants(guilds: &[UnavailableGuild]) -> Vec<TenantId> {
    guilds
        .iter()
        .map(|guild| TenantId::from(guild.id.to_string()))
        .collect()
}

/// A GUILD_DELETE means we were removed unless Discord flags an outage
pub fn departure(guild_id: GuildId, unavailable: bool) -> Option<PlatformEvent> {
    (!unavailable).then(|| PlatformEvent::TenantLeft(TenantId::from(guild_id.to_string())))
}

pub fn stage_state(stage: ConnectionStage) -> ConnectionState {
    match stage {
        ConnectionStage::Connected => ConnectionState::Streaming,
        ConnectionStage::Disconnected => ConnectionState::Disconnected,
        _ => ConnectionState::Connecting,
    }
}
