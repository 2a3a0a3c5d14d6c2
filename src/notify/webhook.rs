use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, instrument};

use super::{Notification, Notifier};
use crate::error::PublishError;

/// Generic HTTP subscriber: POSTs `{subject, message}` as JSON
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    name: String,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(subscriber = %self.name))]
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                subscriber: self.name.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("webhook rejected notification with status: {}", status);
            if let Ok(body) = response.text().await {
                debug!("webhook error response: {}", body);
            }
            return Err(PublishError::Rejected {
                subscriber: self.name.clone(),
                status: status.as_u16(),
            });
        }

        debug!("webhook accepted notification");
        Ok(())
    }
}
