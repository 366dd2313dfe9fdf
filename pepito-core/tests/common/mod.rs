// ABOUTME: Shared test doubles for pepito-core integration tests
// ABOUTME: MockPlatform serves channels from a map; MockChannel records what it was sent
#![allow(dead_code)]

use async_trait::async_trait;
use pepito_core::registry::{Registry, SharedRegistry};
use pepito_core::traits::{ChatChannel, ChatPlatform, MessageContent, Tenant};
use pepito_core::TenantId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock channel that records sent messages
#[derive(Debug, Clone)]
pub struct MockChannel {
    id: String,
    fail: bool,
    sent_messages: Arc<Mutex<Vec<MessageContent>>>,
}

impl MockChannel {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fail: false,
            sent_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A channel whose every send is rejected
    pub fn failing(id: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(id)
        }
    }

    pub fn sent_messages(&self) -> Vec<MessageContent> {
        self.sent_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatChannel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<String> {
        Some(format!("channel-{}", self.id))
    }

    async fn send(&self, content: MessageContent) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("Missing Access");
        }
        self.sent_messages.lock().unwrap().push(content);
        Ok(())
    }
}

/// Mock platform for testing
#[derive(Default)]
pub struct MockPlatform {
    channels: HashMap<String, MockChannel>,
    tenants: Vec<Tenant>,
    default_channels: HashMap<TenantId, MockChannel>,
    lookups: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: MockChannel) -> Self {
        self.channels.insert(channel.id.clone(), channel);
        self
    }

    pub fn with_tenant(mut self, tenant: Tenant, default_channel: Option<MockChannel>) -> Self {
        if let Some(channel) = default_channel {
            self.default_channels.insert(tenant.id.clone(), channel);
        }
        self.tenants.push(tenant);
        self
    }

    /// Channel ids passed to `get_channel`, in call order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    type Channel = MockChannel;

    fn platform_id(&self) -> &'static str {
        "mock"
    }

    async fn get_channel(&self, id: &str) -> Option<MockChannel> {
        self.lookups.lock().unwrap().push(id.to_string());
        self.channels.get(id).cloned()
    }

    async fn tenants(&self) -> Vec<Tenant> {
        self.tenants.clone()
    }

    async fn default_channel(&self, tenant_id: &TenantId) -> Option<MockChannel> {
        self.default_channels.get(tenant_id).cloned()
    }
}

/// Empty registry persisting into a fresh temp dir (kept alive by the returned guard)
pub fn temp_registry() -> (tempfile::TempDir, SharedRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::empty(dir.path().join("channels.json")).into_shared();
    (dir, registry)
}
