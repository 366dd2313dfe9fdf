// ABOUTME: Slash-command contract: /setchannel configures a tenant's destination, /announce broadcasts
// ABOUTME: Platform-neutral; the adapter parses interactions into requests and renders replies

use crate::dispatch::broadcast;
use crate::registry::{ChannelId, RegistryEntry, SetOutcome, SharedRegistry, TenantId};
use crate::traits::{ChatPlatform, Embed, MessageContent, Tenant};

pub const SETCHANNEL: &str = "setchannel";
pub const ANNOUNCE: &str = "announce";

const ANNOUNCE_COLOR: u32 = 0x3498db;

// =============================================================================
// Definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// A text channel of the tenant
    Channel,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOption {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
}

/// Declarative command definition registered with the host platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<CommandOption>,
}

/// Commands to register. `/announce` only exists when an operator tenant is configured.
pub fn command_specs(operator_configured: bool) -> Vec<CommandSpec> {
    let mut specs = vec![CommandSpec {
        name: SETCHANNEL,
        description: "Set the channel for Pépito notifications",
        options: vec![CommandOption {
            name: "channel",
            description: "The channel where notifications will be sent",
            kind: OptionKind::Channel,
            required: true,
        }],
    }];
    if operator_configured {
        specs.push(CommandSpec {
            name: ANNOUNCE,
            description: "Send a global announcement to all servers.",
            options: vec![CommandOption {
                name: "message",
                description: "The announcement text",
                kind: OptionKind::String,
                required: true,
            }],
        });
    }
    specs
}

// =============================================================================
// Requests and replies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetChannel { channel_id: ChannelId },
    Announce { message: String },
}

/// Who ran the command and what they are allowed to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub user_id: String,
    /// Holds the platform's administrative capability in the tenant
    pub can_manage: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// `None` when invoked outside a tenant (e.g. a direct message)
    pub tenant: Option<Tenant>,
    pub invoker: Invoker,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    /// Visible only to the invoker
    pub ephemeral: bool,
}

impl CommandReply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

pub async fn handle_command<P: ChatPlatform>(
    platform: &P,
    registry: &SharedRegistry,
    operator: Option<&TenantId>,
    request: CommandRequest,
) -> CommandReply {
    let Some(tenant) = request.tenant else {
        return CommandReply::private("This command can only be used in a server.");
    };

    match request.command {
        Command::SetChannel { channel_id } => {
            set_channel(registry, &tenant, &request.invoker, channel_id).await
        }
        Command::Announce { message } => {
            announce(platform, registry, operator, &tenant, &request.invoker, &message).await
        }
    }
}

/// Configure `tenant`'s notification channel
pub async fn set_channel(
    registry: &SharedRegistry,
    tenant: &Tenant,
    invoker: &Invoker,
    channel_id: ChannelId,
) -> CommandReply {
    if !invoker.can_manage {
        tracing::info!(
            tenant_id = %tenant.id,
            user_id = %invoker.user_id,
            "Rejected /setchannel without permission"
        );
        return CommandReply::private("You do not have permission to use this command.");
    }

    let mention = format!("<#{}>", channel_id);
    let entry = RegistryEntry::new(tenant.id.clone(), channel_id).with_name(&tenant.name);
    let outcome = registry.lock().await.set(entry);

    tracing::info!(
        tenant_id = %tenant.id,
        tenant = %tenant.name,
        outcome = ?outcome,
        "Notification channel configured"
    );

    match outcome {
        SetOutcome::Created => CommandReply::public(format!(
            "Channel has been set. Pépito notifications will now be sent to {}",
            mention
        )),
        SetOutcome::Updated { .. } => CommandReply::public(format!(
            "Channel has been updated. Pépito notifications will now be sent to {}",
            mention
        )),
        SetOutcome::Unchanged => CommandReply::public(format!(
            "Pépito notifications are already being sent to {}",
            mention
        )),
    }
}

pub fn announcement_message(message: &str) -> MessageContent {
    Embed::new("This is a global announcement from Pépito! 🐈")
        .description(message)
        .color(ANNOUNCE_COLOR)
        .into()
}

/// Broadcast `message` to every configured tenant except the operator's own
pub async fn announce<P: ChatPlatform>(
    platform: &P,
    registry: &SharedRegistry,
    operator: Option<&TenantId>,
    tenant: &Tenant,
    invoker: &Invoker,
    message: &str,
) -> CommandReply {
    let Some(operator) = operator.filter(|op| **op == tenant.id) else {
        return CommandReply::private("This command can only be used in the developer server.");
    };
    if tenant.owner_id.as_deref() != Some(invoker.user_id.as_str()) {
        tracing::info!(
            tenant_id = %tenant.id,
            user_id = %invoker.user_id,
            "Rejected /announce from non-owner"
        );
        return CommandReply::private(
            "Only the owner of the developer server can send announcements.",
        );
    }

    let entries = registry.lock().await.snapshot();
    if entries.iter().all(|entry| entry.tenant_id == *operator) {
        return CommandReply::private("No channels have been set yet.");
    }

    let announcement = announcement_message(message);
    let report = broadcast(platform, &entries, &announcement, Some(operator)).await;
    tracing::info!(
        delivered = report.delivered.len(),
        unresolved = report.unresolved.len(),
        failed = report.failed.len(),
        "Announcement broadcast"
    );

    if report.is_complete() {
        CommandReply::private("Announcement sent successfully to all servers!")
    } else {
        let failed: Vec<&str> = report.undelivered().map(RegistryEntry::label).collect();
        CommandReply::private(format!(
            "Announcement sent, but failed to deliver to the following servers:\n{}",
            failed.join("\n")
        ))
    }
}
