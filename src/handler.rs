// ABOUTME: Routes Discord platform signals into the core: lifecycle updates and slash commands
// ABOUTME: Registers commands on first READY; answers each interaction on its own task

use pepito_core::commands::{
    command_specs, handle_command, Command, CommandReply, CommandRequest, Invoker, ANNOUNCE,
    SETCHANNEL,
};
use pepito_core::lifecycle::{
    on_tenant_joined, on_tenant_left, on_tenant_renamed, on_tenants_synced,
};
use pepito_core::{AppContext, ChannelId, Tenant};
use serenity::builder::EditInteractionResponse;
use serenity::model::application::{
    Command as SlashCommand, CommandDataOptionValue, CommandInteraction,
};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::platform::discord::builders::{create_commands, interaction_reply};
use crate::platform::discord::can_manage;
use crate::platform::{DiscordPlatform, PlatformEvent};

pub struct EventHandler {
    ctx: AppContext,
    platform: DiscordPlatform,
    commands_registered: bool,
}

impl EventHandler {
    pub fn new(ctx: AppContext, platform: DiscordPlatform) -> Self {
        Self {
            ctx,
            platform,
            commands_registered: false,
        }
    }

    /// Process platform events until the gateway side hangs up
    pub async fn run(mut self, mut events: mpsc::Receiver<PlatformEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("Platform event stream ended");
    }

    pub async fn handle(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Ready { tenant_ids } => {
                let removed = on_tenants_synced(&self.ctx.registry, &tenant_ids).await;
                tracing::info!(
                    tenants = tenant_ids.len(),
                    pruned = removed.len(),
                    "Registry synced with session"
                );
                if !self.commands_registered {
                    self.register_commands().await;
                }
            }
            PlatformEvent::TenantJoined(tenant) => {
                on_tenant_joined(&self.platform, &tenant).await;
            }
            PlatformEvent::TenantLeft(tenant_id) => {
                on_tenant_left(&self.ctx.registry, &tenant_id).await;
            }
            PlatformEvent::TenantRenamed { tenant_id, name } => {
                on_tenant_renamed(&self.ctx.registry, &tenant_id, &name).await;
            }
            PlatformEvent::Command(command) => {
                if self.ctx.is_shutting_down() {
                    tracing::debug!(
                        interaction_id = %command.id,
                        "Dropping command during shutdown"
                    );
                    return;
                }
                let ctx = self.ctx.clone();
                let platform = self.platform.clone();
                tokio::spawn(async move { answer_interaction(ctx, platform, *command).await });
            }
        }
    }

    async fn register_commands(&mut self) {
        let specs = command_specs(self.ctx.operator_tenant().is_some());
        let commands = create_commands(&specs);
        match SlashCommand::set_global_commands(self.platform.http(), commands).await {
            Ok(registered) => {
                self.commands_registered = true;
                tracing::info!(count = registered.len(), "Registered application commands");
            }
            Err(e) => {
                pepito_core::metrics::record_error("command_registration");
                tracing::error!(error = %e, "Failed to register application commands");
            }
        }
    }
}

/// The parts of a slash command invocation the relay cares about
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandInvocation {
    pub name: String,
    pub guild_id: Option<String>,
    pub user_id: String,
    /// Administrator or manage-channels in the invoking guild
    pub can_manage: bool,
    /// Option name to value; channel options carry the channel id
    pub options: HashMap<String, String>,
}

impl From<&CommandInteraction> for CommandInvocation {
    fn from(command: &CommandInteraction) -> Self {
        let options = command
            .data
            .options
            .iter()
            .filter_map(|option| {
                let value = match &option.value {
                    CommandDataOptionValue::Channel(id) => id.to_string(),
                    CommandDataOptionValue::String(text) => text.clone(),
                    _ => return None,
                };
                Some((option.name.clone(), value))
            })
            .collect();
        let permissions = command.member.as_ref().and_then(|member| member.permissions);
        Self {
            name: command.data.name.clone(),
            guild_id: command.guild_id.map(|id| id.to_string()),
            user_id: command.user.id.to_string(),
            can_manage: permissions.is_some_and(can_manage),
            options,
        }
    }
}

impl CommandInvocation {
    fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

/// Outcome of reading an invocation
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedInteraction {
    Request(CommandRequest),
    /// Known shape but unusable; reply with this and stop
    Reject(CommandReply),
}

/// Turn an invocation into a platform-neutral command request.
/// `tenant` is the cached directory entry for the invocation's guild.
pub fn parse_interaction(
    invocation: &CommandInvocation,
    tenant: Option<Tenant>,
) -> ParsedInteraction {
    let command = match invocation.name.as_str() {
        SETCHANNEL => match invocation.option("channel") {
            Some(id) => Command::SetChannel {
                channel_id: ChannelId::from(id),
            },
            None => {
                return ParsedInteraction::Reject(CommandReply::private("Please pick a channel."))
            }
        },
        ANNOUNCE => match invocation.option("message") {
            Some(message) if !message.trim().is_empty() => Command::Announce {
                message: message.to_string(),
            },
            _ => {
                return ParsedInteraction::Reject(CommandReply::private(
                    "Please provide a message to announce.",
                ))
            }
        },
        other => {
            tracing::warn!(command = %other, "Unknown command");
            return ParsedInteraction::Reject(CommandReply::private("Unknown command."));
        }
    };

    // A guild we have not cached yet still counts as a tenant, just without an owner
    let tenant = tenant.or_else(|| invocation.guild_id.as_deref().map(|id| Tenant::new(id, id)));

    ParsedInteraction::Request(CommandRequest {
        tenant,
        invoker: Invoker {
            user_id: invocation.user_id.clone(),
            can_manage: invocation.can_manage,
        },
        command,
    })
}

async fn answer_interaction(
    ctx: AppContext,
    platform: DiscordPlatform,
    command: CommandInteraction,
) {
    let invocation = CommandInvocation::from(&command);
    let tenant = invocation
        .guild_id
        .as_deref()
        .and_then(|guild_id| platform.tenant(guild_id));

    let request = match parse_interaction(&invocation, tenant) {
        ParsedInteraction::Request(request) => request,
        ParsedInteraction::Reject(reply) => {
            reply_now(&platform, &command, &reply).await;
            return;
        }
    };

    tracing::info!(
        command = ?request.command,
        tenant_id = ?request.tenant.as_ref().map(|t| t.id.to_string()),
        user_id = %request.invoker.user_id,
        "Handling command"
    );

    let operator = ctx.operator_tenant();

    // Fan-out can outlast the interaction's response window, so acknowledge first
    if matches!(request.command, Command::Announce { .. }) {
        if let Err(e) = command.defer_ephemeral(platform.http()).await {
            tracing::warn!(error = %e, "Failed to acknowledge interaction");
            return;
        }
        let reply = handle_command(&platform, &ctx.registry, operator.as_ref(), request).await;
        let edit = EditInteractionResponse::new().content(reply.content);
        if let Err(e) = command.edit_response(platform.http(), edit).await {
            tracing::warn!(error = %e, "Failed to deliver deferred reply");
        }
        return;
    }

    let reply = handle_command(&platform, &ctx.registry, operator.as_ref(), request).await;
    reply_now(&platform, &command, &reply).await;
}

async fn reply_now(
    platform: &DiscordPlatform,
    command: &CommandInteraction,
    reply: &CommandReply,
) {
    if let Err(e) = command
        .create_response(platform.http(), interaction_reply(reply))
        .await
    {
        tracing::warn!(error = %e, "Failed to answer interaction");
    }
}
