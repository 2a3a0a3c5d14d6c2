//! Discord webhook subscriber
//!
//! Renders the alert carried in a notification as a Discord embed. The alert
//! fields are read from the JSON message; a message that is not a JSON object
//! becomes the embed description as-is.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::{Notification, Notifier};
use crate::error::PublishError;

const COLOR_RED: u32 = 15158332;
const COLOR_ORANGE: u32 = 15105570;

/// Alert fields shown as embed fields, with their labels
const EMBED_FIELDS: &[(&str, &str, bool)] = &[
    ("host", "🌐 Host", true),
    ("region", "📍 Region", true),
    ("errorType", "⚠️ Error Type", true),
    ("url", "🔗 URL", false),
    ("runbookUrl", "📖 Runbook", false),
    ("dashboardUrl", "📊 Dashboard", false),
];

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    name: String,
    url: String,
    user_id: Option<String>,
}

impl DiscordNotifier {
    pub fn new(
        client: Client,
        name: impl Into<String>,
        url: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            url: url.into(),
            user_id,
        }
    }

    pub fn build_alert_embed(&self, notification: &Notification) -> Embed {
        let Ok(Value::Object(alert)) = serde_json::from_str::<Value>(&notification.message) else {
            return Embed {
                title: Some(notification.subject.clone()),
                description: Some(notification.message.clone()),
                color: Some(COLOR_ORANGE),
                fields: Vec::new(),
                footer: None,
                timestamp: None,
            };
        };

        let text = |key: &str| alert.get(key).and_then(Value::as_str).map(str::to_string);

        let fields = EMBED_FIELDS
            .iter()
            .filter_map(|(key, label, inline)| {
                text(*key).map(|value| EmbedField {
                    name: label.to_string(),
                    value,
                    inline: *inline,
                })
            })
            .collect();

        let color = match text("severity").as_deref() {
            Some("HIGH") => COLOR_RED,
            _ => COLOR_ORANGE,
        };

        Embed {
            title: Some(format!("🚨 {}", notification.subject)),
            description: text("errorMessage"),
            color: Some(color),
            fields,
            footer: text("alertId").map(|id| EmbedFooter {
                text: format!("Alert: {id}"),
            }),
            timestamp: text("detectedAt"),
        }
    }

    pub fn build_message(&self, notification: &Notification) -> Message {
        let mut builder = MessageBuilder::new().add_embed(self.build_alert_embed(notification));
        if let Some(user_id) = &self.user_id {
            builder = builder.content(format!("🚨 {} <@{user_id}>", notification.subject));
        }
        builder.build()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(subscriber = %self.name))]
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        let message = self.build_message(notification);

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                subscriber: self.name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Discord message failed with status: {}", status);
            if let Ok(error_text) = response.text().await {
                debug!("Discord API error response: {}", error_text);
            }
            return Err(PublishError::Rejected {
                subscriber: self.name.clone(),
                status: status.as_u16(),
            });
        }

        info!("sent Discord alert");
        Ok(())
    }
}
