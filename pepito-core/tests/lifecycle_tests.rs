// ABOUTME: Integration tests for tenant join/leave/rename handling and the reminder sweep
// ABOUTME: Sweep timing is checked with paused tokio time

mod common;

use common::{temp_registry, MockChannel, MockPlatform};
use pepito_core::config::ReminderConfig;
use pepito_core::lifecycle::{
    on_tenant_joined, on_tenant_left, on_tenant_renamed, on_tenants_synced, run_reminder_sweep,
    sweep_once,
};
use pepito_core::{RegistryEntry, Tenant, TenantId};
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_join_sends_welcome_to_default_channel() {
    let welcome = MockChannel::new("general");
    let tenant = Tenant::new("100", "Cat Lovers");
    let platform = MockPlatform::new().with_tenant(tenant.clone(), Some(welcome.clone()));

    assert!(on_tenant_joined(&platform, &tenant).await);

    let sent = welcome.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].headline(),
        "Hello! Thank you for adding me to Cat Lovers"
    );
}

#[tokio::test]
async fn test_join_without_sendable_channel() {
    let tenant = Tenant::new("100", "Locked");
    let platform = MockPlatform::new().with_tenant(tenant.clone(), None);
    assert!(!on_tenant_joined(&platform, &tenant).await);

    let failing = MockChannel::failing("general");
    let platform = MockPlatform::new().with_tenant(tenant.clone(), Some(failing));
    assert!(!on_tenant_joined(&platform, &tenant).await);
}

#[tokio::test]
async fn test_leave_removes_entry_idempotently() {
    let (dir, registry) = temp_registry();
    registry.lock().await.set(RegistryEntry::new("100", "c1"));

    let removed = on_tenant_left(&registry, &TenantId::from("100")).await;
    assert_eq!(removed.map(|e| e.channel_id.to_string()), Some("c1".to_string()));
    assert!(on_tenant_left(&registry, &TenantId::from("100")).await.is_none());

    let reloaded = pepito_core::Registry::load(dir.path().join("channels.json"));
    assert!(reloaded.is_empty());
}

#[tokio::test]
async fn test_sync_forgets_tenants_missing_from_session() {
    let (dir, registry) = temp_registry();
    {
        let mut registry = registry.lock().await;
        registry.set(RegistryEntry::new("100", "c1"));
        registry.set(RegistryEntry::new("200", "c2").with_name("Kicked us offline"));
    }

    let present = vec![TenantId::from("100"), TenantId::from("300")];
    let removed = on_tenants_synced(&registry, &present).await;
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].tenant_id.as_str(), "200");

    // Nothing left to prune on a second session with the same tenants
    assert!(on_tenants_synced(&registry, &present).await.is_empty());

    let reloaded = pepito_core::Registry::load(dir.path().join("channels.json"));
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.contains(&TenantId::from("100")));
}

#[tokio::test]
async fn test_rename_refreshes_name() {
    let (_dir, registry) = temp_registry();
    registry
        .lock()
        .await
        .set(RegistryEntry::new("100", "c1").with_name("Old"));

    assert!(on_tenant_renamed(&registry, &TenantId::from("100"), "New").await);
    assert!(!on_tenant_renamed(&registry, &TenantId::from("100"), "New").await);
    assert!(!on_tenant_renamed(&registry, &TenantId::from("200"), "Other").await);

    let registry = registry.lock().await;
    let entry = registry.get(&TenantId::from("100")).unwrap();
    assert_eq!(entry.tenant_name.as_deref(), Some("New"));
    assert_eq!(entry.channel_id.as_str(), "c1");
}

#[tokio::test]
async fn test_sweep_reminds_only_unconfigured_tenants() {
    let (_dir, registry) = temp_registry();
    registry.lock().await.set(RegistryEntry::new("1", "c1"));

    let configured = MockChannel::new("g1");
    let unconfigured = MockChannel::new("g2");
    let broken = MockChannel::failing("g4");
    let platform = MockPlatform::new()
        .with_tenant(Tenant::new("1", "Configured"), Some(configured.clone()))
        .with_tenant(
            Tenant::new("2", "Unconfigured").with_owner("42"),
            Some(unconfigured.clone()),
        )
        .with_tenant(Tenant::new("3", "No Channel"), None)
        .with_tenant(Tenant::new("4", "Broken"), Some(broken));

    let report = sweep_once(&platform, &registry).await;

    assert_eq!(report.reminded, vec![TenantId::from("2")]);
    assert_eq!(report.no_channel, vec![TenantId::from("3")]);
    assert_eq!(report.failed, vec![TenantId::from("4")]);
    assert!(configured.sent_messages().is_empty());

    let sent = unconfigured.sent_messages();
    assert_eq!(sent.len(), 1);
    let pepito_core::MessageContent::Embed(embed) = &sent[0] else {
        panic!("expected embed");
    };
    assert_eq!(embed.title, "Pépito Reminder");
    assert!(embed.description.as_deref().unwrap().contains("<@42>"));
}

#[tokio::test(start_paused = true)]
async fn test_reminder_sweep_schedule() {
    let (_dir, registry) = temp_registry();
    let channel = MockChannel::new("g1");
    let platform = std::sync::Arc::new(
        MockPlatform::new().with_tenant(Tenant::new("1", "Cats"), Some(channel.clone())),
    );
    let config = ReminderConfig {
        enabled: true,
        interval_secs: 3600,
        initial_delay_secs: 60,
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = {
        let platform = platform.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            run_reminder_sweep(platform.as_ref(), &registry, &config, shutdown_rx).await
        })
    };

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(channel.sent_messages().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.sent_messages().len(), 1);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(channel.sent_messages().len(), 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_reminder_sweep_disabled() {
    let (_dir, registry) = temp_registry();
    let platform = MockPlatform::new();
    let config = ReminderConfig {
        enabled: false,
        ..ReminderConfig::default()
    };
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    // Returns immediately
    tokio::time::timeout(
        Duration::from_secs(1),
        run_reminder_sweep(&platform, &registry, &config, shutdown_rx),
    )
    .await
    .unwrap();
}
