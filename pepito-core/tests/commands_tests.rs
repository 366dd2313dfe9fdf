// ABOUTME: Integration tests for /setchannel and /announce handling
// ABOUTME: Checks replies, permission checks, and the resulting registry state

mod common;

use common::{temp_registry, MockChannel, MockPlatform};
use pepito_core::commands::{
    handle_command, set_channel, Command, CommandReply, CommandRequest, Invoker,
};
use pepito_core::{ChannelId, MessageContent, RegistryEntry, Tenant, TenantId};

fn admin() -> Invoker {
    Invoker {
        user_id: "42".to_string(),
        can_manage: true,
    }
}

fn member() -> Invoker {
    Invoker {
        user_id: "7".to_string(),
        can_manage: false,
    }
}

fn cats() -> Tenant {
    Tenant::new("100", "Cat Lovers").with_owner("42")
}

#[tokio::test]
async fn test_setchannel_created_updated_unchanged() {
    let (_dir, registry) = temp_registry();
    let tenant = cats();

    let reply = set_channel(&registry, &tenant, &admin(), ChannelId::from("555")).await;
    assert_eq!(
        reply,
        CommandReply::public("Channel has been set. Pépito notifications will now be sent to <#555>")
    );

    let reply = set_channel(&registry, &tenant, &admin(), ChannelId::from("666")).await;
    assert_eq!(
        reply.content,
        "Channel has been updated. Pépito notifications will now be sent to <#666>"
    );

    let reply = set_channel(&registry, &tenant, &admin(), ChannelId::from("666")).await;
    assert_eq!(
        reply.content,
        "Pépito notifications are already being sent to <#666>"
    );

    let registry = registry.lock().await;
    let entry = registry.get(&TenantId::from("100")).unwrap();
    assert_eq!(entry.channel_id, ChannelId::from("666"));
    assert_eq!(entry.tenant_name.as_deref(), Some("Cat Lovers"));
}

#[tokio::test]
async fn test_setchannel_requires_permission() {
    let (_dir, registry) = temp_registry();

    let reply = set_channel(&registry, &cats(), &member(), ChannelId::from("555")).await;

    assert_eq!(
        reply,
        CommandReply::private("You do not have permission to use this command.")
    );
    assert!(registry.lock().await.is_empty());
}

#[tokio::test]
async fn test_setchannel_persists() {
    let (dir, registry) = temp_registry();
    set_channel(&registry, &cats(), &admin(), ChannelId::from("555")).await;

    let reloaded = pepito_core::Registry::load(dir.path().join("channels.json"));
    assert_eq!(
        reloaded.get(&TenantId::from("100")).map(|e| e.channel_id.as_str()),
        Some("555")
    );
}

#[tokio::test]
async fn test_command_outside_tenant() {
    let (_dir, registry) = temp_registry();
    let platform = MockPlatform::new();
    let reply = handle_command(
        &platform,
        &registry,
        None,
        CommandRequest {
            tenant: None,
            invoker: admin(),
            command: Command::SetChannel {
                channel_id: ChannelId::from("1"),
            },
        },
    )
    .await;
    assert!(reply.ephemeral);
    assert!(registry.lock().await.is_empty());
}

async fn announce(
    platform: &MockPlatform,
    registry: &pepito_core::SharedRegistry,
    operator: Option<&TenantId>,
    tenant: Tenant,
    invoker: Invoker,
) -> CommandReply {
    handle_command(
        platform,
        registry,
        operator,
        CommandRequest {
            tenant: Some(tenant),
            invoker,
            command: Command::Announce {
                message: "Pépito has a new door".to_string(),
            },
        },
    )
    .await
}

#[tokio::test]
async fn test_announce_reaches_all_but_operator_and_lists_failures() {
    let (_dir, registry) = temp_registry();
    {
        let mut registry = registry.lock().await;
        registry.set(RegistryEntry::new("100", "c100").with_name("Cat Lovers"));
        registry.set(RegistryEntry::new("200", "c200").with_name("Dog Haters"));
        registry.set(RegistryEntry::new("300", "c300").with_name("Gone Server"));
        registry.set(RegistryEntry::new("400", "c400").with_name("Locked Server"));
    }
    let operator_channel = MockChannel::new("c100");
    let reachable = MockChannel::new("c200");
    let platform = MockPlatform::new()
        .with_channel(operator_channel.clone())
        .with_channel(reachable.clone())
        .with_channel(MockChannel::failing("c400"));
    let operator = TenantId::from("100");

    let reply = announce(&platform, &registry, Some(&operator), cats(), admin()).await;

    assert!(operator_channel.sent_messages().is_empty());
    let sent = reachable.sent_messages();
    assert_eq!(sent.len(), 1);
    let MessageContent::Embed(embed) = &sent[0] else {
        panic!("expected embed");
    };
    assert_eq!(embed.description.as_deref(), Some("Pépito has a new door"));

    assert!(reply.ephemeral);
    assert_eq!(
        reply.content,
        "Announcement sent, but failed to deliver to the following servers:\nGone Server\nLocked Server"
    );
}

#[tokio::test]
async fn test_announce_success_reply() {
    let (_dir, registry) = temp_registry();
    registry
        .lock()
        .await
        .set(RegistryEntry::new("200", "c200").with_name("Dog Haters"));
    let platform = MockPlatform::new().with_channel(MockChannel::new("c200"));
    let operator = TenantId::from("100");

    let reply = announce(&platform, &registry, Some(&operator), cats(), admin()).await;
    assert_eq!(
        reply,
        CommandReply::private("Announcement sent successfully to all servers!")
    );
}

#[tokio::test]
async fn test_announce_restricted_to_operator_tenant_and_owner() {
    let (_dir, registry) = temp_registry();
    registry.lock().await.set(RegistryEntry::new("200", "c200"));
    let target = MockChannel::new("c200");
    let platform = MockPlatform::new().with_channel(target.clone());
    let operator = TenantId::from("999");

    // Wrong tenant
    let reply = announce(&platform, &registry, Some(&operator), cats(), admin()).await;
    assert_eq!(
        reply.content,
        "This command can only be used in the developer server."
    );

    // No operator configured
    let reply = announce(&platform, &registry, None, cats(), admin()).await;
    assert!(reply.ephemeral);

    // Right tenant, not the owner
    let operator_tenant = Tenant::new("999", "Dev").with_owner("1");
    let reply = announce(&platform, &registry, Some(&operator), operator_tenant, admin()).await;
    assert!(reply.content.starts_with("Only the owner"));

    assert!(target.sent_messages().is_empty());
}

#[tokio::test]
async fn test_announce_with_no_channels() {
    let (_dir, registry) = temp_registry();
    let platform = MockPlatform::new();
    let operator = TenantId::from("100");

    let reply = announce(&platform, &registry, Some(&operator), cats(), admin()).await;
    assert_eq!(reply.content, "No channels have been set yet.");
}
