// ABOUTME: Application context shared by every task: config, registry, translator, shutdown signal
// ABOUTME: Startup order is load registry → open feed → register handlers; teardown is stop feed → flush registry

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::feed::{FeedClient, HttpFeedTransport, ReconnectPolicy};
use crate::registry::{Registry, SharedRegistry, TenantId};
use crate::translate::Translator;

/// Resolves once shutdown has been requested or the sender is gone
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: SharedRegistry,
    pub translator: Arc<Translator>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppContext {
    /// Build the context, loading the registry from the configured path
    pub fn new(config: Config) -> Result<Self> {
        let registry = Registry::load(config.registry.path());
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: Registry) -> Result<Self> {
        let translator = Translator::from_config(&config.notification)
            .context("Invalid notification settings")?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            registry: registry.into_shared(),
            translator: Arc::new(translator),
            shutdown: Arc::new(shutdown),
        })
    }

    /// Feed client for the configured endpoint; not started until spawned
    pub fn feed_client(&self) -> Result<FeedClient> {
        let transport = HttpFeedTransport::new(&self.config.feed.url)?;
        let policy = ReconnectPolicy::fixed(self.config.feed.reconnect_delay());
        Ok(FeedClient::new(Box::new(transport), policy))
    }

    /// The tenant allowed to send announcements, if configured
    pub fn operator_tenant(&self) -> Option<TenantId> {
        self.config.operator.tenant_id.as_deref().map(TenantId::from)
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn request_shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Final save of the registry during teardown
    pub async fn flush_registry(&self) -> Result<()> {
        let registry = self.registry.lock().await;
        registry.try_save()?;
        tracing::info!(tenants = registry.len(), "Channel registry flushed");
        Ok(())
    }
}
