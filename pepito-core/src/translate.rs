// ABOUTME: Turns raw feed events into notifications ("Pépito is out (HH:MM:SS)")
// ABOUTME: Pure and synchronous; event times are rendered in the configured IANA time zone

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::NotificationConfig;
use crate::feed::{RawEvent, PEPITO_EVENT};
use crate::traits::{Embed, EmbedFooter, MessageContent};

/// A notification derived from one movement event. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub image_url: String,
    /// Instant of the movement (the event's own time)
    pub timestamp: DateTime<Utc>,
    pub color: u32,
    pub footer: EmbedFooter,
}

impl Notification {
    pub fn to_content(&self) -> MessageContent {
        Embed::new(&self.title)
            .color(self.color)
            .image(&self.image_url)
            .footer(self.footer.clone())
            .timestamp(self.timestamp)
            .into()
    }
}

#[derive(Debug, Clone)]
pub struct Translator {
    subject: String,
    footer: EmbedFooter,
    color: u32,
    tz: Tz,
}

impl Translator {
    pub fn new(subject: impl Into<String>, icon_url: impl Into<String>, tz: Tz) -> Self {
        let subject = subject.into();
        Self {
            footer: EmbedFooter::with_icon(subject.clone(), icon_url),
            subject,
            color: 0x0099ff,
            tz,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> anyhow::Result<Self> {
        let mut translator =
            Self::new(&config.subject, &config.icon_url, config.tz()?).with_color(config.color);
        translator.footer.text = config.footer_text().to_string();
        Ok(translator)
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Build the notification for `event`, or `None` when the event is not
    /// a deliverable movement.
    pub fn translate(&self, event: &RawEvent) -> Option<Notification> {
        if event.event != PEPITO_EVENT {
            return None;
        }

        let Some(timestamp) = DateTime::<Utc>::from_timestamp(event.time, 0) else {
            tracing::warn!(time = event.time, "Event time out of range, dropping event");
            return None;
        };
        let clock = self.format_time(timestamp);

        let title = match event.kind.as_str() {
            "in" => format!("{} is back home ({})", self.subject, clock),
            "out" => format!("{} is out ({})", self.subject, clock),
            other => {
                tracing::warn!(kind = %other, "Unexpected movement type, dropping event");
                return None;
            }
        };

        Some(Notification {
            title,
            image_url: event.img.clone(),
            timestamp,
            color: self.color,
            footer: self.footer.clone(),
        })
    }

    /// Zero-padded 24-hour `HH:MM:SS` in the configured zone
    pub fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format("%H:%M:%S").to_string()
    }
}
