// ABOUTME: Reacts to tenants joining, leaving, and renaming; runs the daily setup reminder sweep
// ABOUTME: Only touches the registry; onboarding and reminders are best-effort and never retried

use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ReminderConfig;
use crate::context::shutdown_requested;
use crate::metrics;
use crate::registry::{RegistryEntry, SharedRegistry, TenantId};
use crate::traits::{ChatChannel, ChatPlatform, Embed, EmbedFooter, MessageContent, Tenant};

const ONBOARDING_COLOR: u32 = 0x2ecc71;
const REMINDER_COLOR: u32 = 0xe67e22;

pub fn onboarding_message(tenant_name: &str) -> MessageContent {
    Embed::new(format!("Hello! Thank you for adding me to {}", tenant_name))
        .description(
            "To get started, please use the `/setchannel` command to set a channel for Pépito notifications.",
        )
        .color(ONBOARDING_COLOR)
        .footer(EmbedFooter::new("Pépito Notification System"))
        .into()
}

pub fn reminder_message(owner_id: Option<&str>) -> MessageContent {
    let greeting = match owner_id {
        Some(id) => format!("Hello <@{}>", id),
        None => "Hello".to_string(),
    };
    Embed::new("Pépito Reminder")
        .description(format!(
            "{}, it seems you haven't set a notification channel for Pépito yet! \
             Please use the `/setchannel` command to configure one.",
            greeting
        ))
        .color(REMINDER_COLOR)
        .into()
}

/// Send the one-time onboarding message. Returns true if it was delivered.
pub async fn on_tenant_joined<P: ChatPlatform>(platform: &P, tenant: &Tenant) -> bool {
    tracing::info!(tenant_id = %tenant.id, tenant = %tenant.name, "Joined tenant");

    let Some(channel) = platform.default_channel(&tenant.id).await else {
        tracing::warn!(
            tenant_id = %tenant.id,
            tenant = %tenant.name,
            "No channel to send the welcome message to"
        );
        return false;
    };

    match channel.send(onboarding_message(&tenant.name)).await {
        Ok(()) => {
            tracing::info!(
                tenant_id = %tenant.id,
                channel_id = %channel.id(),
                "Sent welcome message"
            );
            true
        }
        Err(e) => {
            metrics::record_error("onboarding");
            tracing::warn!(
                tenant_id = %tenant.id,
                channel_id = %channel.id(),
                error = %format!("{e:#}"),
                "Failed to send welcome message"
            );
            false
        }
    }
}

/// Forget a tenant that removed us. Idempotent.
pub async fn on_tenant_left(
    registry: &SharedRegistry,
    tenant_id: &TenantId,
) -> Option<RegistryEntry> {
    let removed = registry.lock().await.remove(tenant_id);
    match &removed {
        Some(entry) => tracing::info!(
            tenant_id = %tenant_id,
            tenant = %entry.label(),
            "Removed tenant from registry"
        ),
        None => tracing::info!(tenant_id = %tenant_id, "Left tenant with no configured channel"),
    }
    removed
}

/// Refresh the stored display name. Returns true if the registry changed.
pub async fn on_tenant_renamed(
    registry: &SharedRegistry,
    tenant_id: &TenantId,
    name: &str,
) -> bool {
    let changed = registry.lock().await.rename_tenant(tenant_id, name);
    if changed {
        tracing::info!(tenant_id = %tenant_id, tenant = %name, "Updated tenant name");
    }
    changed
}

/// Reconcile the registry with the full tenant list of a fresh session.
/// Tenants that removed us while we were offline are forgotten here.
pub async fn on_tenants_synced(
    registry: &SharedRegistry,
    present: &[TenantId],
) -> Vec<RegistryEntry> {
    let present: HashSet<TenantId> = present.iter().cloned().collect();
    let removed = registry.lock().await.retain_tenants(&present);
    for entry in &removed {
        tracing::info!(
            tenant_id = %entry.tenant_id,
            tenant = %entry.label(),
            "Removed tenant that is no longer present"
        );
    }
    removed
}

/// Outcome of one reminder sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub reminded: Vec<TenantId>,
    /// No channel the bot can send to
    pub no_channel: Vec<TenantId>,
    pub failed: Vec<TenantId>,
}

/// Remind every tenant without a configured channel, once
pub async fn sweep_once<P: ChatPlatform>(platform: &P, registry: &SharedRegistry) -> SweepReport {
    let tenants = platform.tenants().await;
    let unconfigured: Vec<Tenant> = {
        let registry = registry.lock().await;
        tenants
            .into_iter()
            .filter(|tenant| !registry.contains(&tenant.id))
            .collect()
    };

    let mut report = SweepReport::default();
    for tenant in unconfigured {
        let Some(channel) = platform.default_channel(&tenant.id).await else {
            tracing::debug!(tenant_id = %tenant.id, "No channel to send the reminder to");
            report.no_channel.push(tenant.id);
            continue;
        };

        match channel.send(reminder_message(tenant.owner_id.as_deref())).await {
            Ok(()) => {
                tracing::info!(
                    tenant_id = %tenant.id,
                    tenant = %tenant.name,
                    channel_id = %channel.id(),
                    "Sent setup reminder"
                );
                report.reminded.push(tenant.id);
            }
            Err(e) => {
                metrics::record_error("reminder");
                tracing::warn!(
                    tenant_id = %tenant.id,
                    tenant = %tenant.name,
                    error = %format!("{e:#}"),
                    "Failed to send setup reminder"
                );
                report.failed.push(tenant.id);
            }
        }
    }

    tracing::info!(
        reminded = report.reminded.len(),
        no_channel = report.no_channel.len(),
        failed = report.failed.len(),
        "Reminder sweep finished"
    );
    report
}

/// Run `sweep_once` after the initial delay and then every interval until shutdown
pub async fn run_reminder_sweep<P: ChatPlatform>(
    platform: &P,
    registry: &SharedRegistry,
    config: &ReminderConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    if !config.enabled {
        tracing::info!("Reminder sweep disabled");
        return;
    }

    let period = config.interval().max(Duration::from_secs(1));
    tracing::info!(
        initial_delay_secs = config.initial_delay_secs,
        interval_secs = period.as_secs(),
        "Starting reminder sweep"
    );

    let mut ticker = interval_at(Instant::now() + config.initial_delay(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }
        sweep_once(platform, registry).await;
    }

    tracing::info!("Reminder sweep stopped");
}
