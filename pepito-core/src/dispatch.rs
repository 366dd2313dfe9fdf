// ABOUTME: Fan-out delivery of one message to every registered destination
// ABOUTME: Per-destination failures are logged and counted; they never stop the loop

use crate::metrics;
use crate::registry::{RegistryEntry, TenantId};
use crate::traits::{ChatChannel, ChatPlatform, MessageContent};

/// Per-destination outcomes of one fan-out. Informational only, never retried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<RegistryEntry>,
    /// Channel could not be resolved (deleted, or no longer visible to us)
    pub unresolved: Vec<RegistryEntry>,
    /// Channel resolved but the send was rejected
    pub failed: Vec<RegistryEntry>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.unresolved.len() + self.failed.len()
    }

    /// Entries that did not receive the message
    pub fn undelivered(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.unresolved.iter().chain(self.failed.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && self.failed.is_empty()
    }
}

/// Deliver `content` to the channel of every entry in `entries`.
pub async fn dispatch<P: ChatPlatform>(
    platform: &P,
    entries: &[RegistryEntry],
    content: &MessageContent,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for entry in entries {
        let Some(channel) = platform.get_channel(entry.channel_id.as_str()).await else {
            tracing::warn!(
                tenant_id = %entry.tenant_id,
                tenant = %entry.label(),
                channel_id = %entry.channel_id,
                "Destination channel not found, skipping"
            );
            metrics::record_delivery("unresolved");
            report.unresolved.push(entry.clone());
            continue;
        };

        match channel.send(content.clone()).await {
            Ok(()) => {
                tracing::debug!(
                    tenant_id = %entry.tenant_id,
                    channel_id = %entry.channel_id,
                    "Delivered"
                );
                metrics::record_delivery("delivered");
                report.delivered.push(entry.clone());
            }
            Err(e) => {
                tracing::error!(
                    tenant_id = %entry.tenant_id,
                    tenant = %entry.label(),
                    channel_id = %entry.channel_id,
                    error = %format!("{e:#}"),
                    "Failed to deliver message"
                );
                metrics::record_delivery("failed");
                report.failed.push(entry.clone());
            }
        }
    }

    report
}

/// Like `dispatch`, but skips the `exclude` tenant (the operator's own server)
pub async fn broadcast<P: ChatPlatform>(
    platform: &P,
    entries: &[RegistryEntry],
    content: &MessageContent,
    exclude: Option<&TenantId>,
) -> DispatchReport {
    let targets: Vec<RegistryEntry> = entries
        .iter()
        .filter(|entry| Some(&entry.tenant_id) != exclude)
        .cloned()
        .collect();
    dispatch(platform, &targets, content).await
}
