// ABOUTME: Renders core message content, command specs, and replies into serenity builders
// ABOUTME: Pure conversions so the wire shape can be checked without a Discord connection

use pepito_core::commands::{CommandReply, CommandSpec, OptionKind};
use pepito_core::traits::{Embed, MessageContent};
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
};
use serenity::model::application::CommandOptionType;
use serenity::model::channel::ChannelType;
use serenity::model::Timestamp;

pub fn create_message(content: &MessageContent) -> CreateMessage {
    match content {
        MessageContent::Plain(text) => CreateMessage::new().content(text),
        MessageContent::Embed(embed) => CreateMessage::new().embed(create_embed(embed)),
    }
}

pub fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut card = CreateEmbed::new().title(&embed.title);
    if let Some(description) = &embed.description {
        card = card.description(description);
    }
    if let Some(color) = embed.color {
        card = card.colour(color);
    }
    if let Some(url) = &embed.image_url {
        card = card.image(url);
    }
    if let Some(footer) = &embed.footer {
        let mut line = CreateEmbedFooter::new(&footer.text);
        if let Some(icon) = &footer.icon_url {
            line = line.icon_url(icon);
        }
        card = card.footer(line);
    }
    if let Some(timestamp) = embed
        .timestamp
        .and_then(|t| Timestamp::from_unix_timestamp(t.timestamp()).ok())
    {
        card = card.timestamp(timestamp);
    }
    card
}

/// Global command definitions; guild text and announcement channels only
pub fn create_commands(specs: &[CommandSpec]) -> Vec<CreateCommand> {
    specs
        .iter()
        .map(|spec| {
            spec.options.iter().fold(
                CreateCommand::new(spec.name).description(spec.description),
                |command, option| {
                    let built = match option.kind {
                        OptionKind::Channel => CreateCommandOption::new(
                            CommandOptionType::Channel,
                            option.name,
                            option.description,
                        )
                        .channel_types(vec![ChannelType::Text, ChannelType::News]),
                        OptionKind::String => CreateCommandOption::new(
                            CommandOptionType::String,
                            option.name,
                            option.description,
                        ),
                    };
                    command.add_option(built.required(option.required))
                },
            )
        })
        .collect()
}

pub fn interaction_reply(reply: &CommandReply) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(&reply.content)
            .ephemeral(reply.ephemeral),
    )
}
