//! Notification fan-out
//!
//! A [`Notification`] is published to every configured subscriber. Each
//! subscriber implements [`Notifier`]; [`FanoutNotifier`] combines them and
//! fails if any subscriber rejected the message, so the caller can leave the
//! event on the queue for redelivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PublishError;

pub mod discord;
pub mod fanout;
pub mod webhook;

pub use discord::DiscordNotifier;
pub use fanout::FanoutNotifier;
pub use webhook::WebhookNotifier;

/// Message handed to the fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    /// JSON-encoded alert body
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Subscriber name used in logs and errors
    fn name(&self) -> &str;

    async fn publish(&self, notification: &Notification) -> Result<(), PublishError>;
}
