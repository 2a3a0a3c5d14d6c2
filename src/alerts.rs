//! Alert dispatcher: failure events in, enriched notifications out
//!
//! Per event: `received → enriched → published`, or `received →
//! enrich-failed` / `publish-failed`. Failed events are left on the queue and
//! come back after the visibility timeout. Published alert ids are kept in
//! an LRU cache so a redelivered event is acknowledged without publishing
//! the same alert again.
//!
//! The alert id comes from the originating record (host and timestamp) when
//! the event carries one, and from the queue message id otherwise. Separate
//! failures always get separate ids; only redeliveries collapse.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AlertMetadata;
use crate::error::{PublishError, SchemaError};
use crate::notify::{Notification, Notifier};
use crate::queue::{Delivery, FailureQueue};
use crate::schema::FailureEvent;

/// Alert severity
///
/// Every probe failure is currently raised as `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "HIGH",
        }
    }
}

/// Alert body published to the fan-out
///
/// Every field is derived from the failure event and static metadata, so a
/// redelivered event produces an identical alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedAlert {
    pub alert_id: String,
    pub severity: Severity,
    pub title: String,
    pub url: String,
    pub host: String,
    pub region: String,
    pub error_type: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
    pub runbook_url: String,
    pub dashboard_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Published,
    /// Already published recently, nothing sent
    Duplicate,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to enrich failure event: {0}")]
    Enrich(#[from] SchemaError),

    #[error("failed to publish alert: {0}")]
    Publish(#[from] PublishError),
}

/// Per-batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub published: usize,
    pub duplicates: usize,
    pub failed: usize,
}

pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    metadata: AlertMetadata,
    published: Mutex<LruCache<String, ()>>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, metadata: AlertMetadata) -> Self {
        let capacity = NonZeroUsize::new(metadata.dedup_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            notifier,
            metadata,
            published: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Build the alert for `event`, delivered as queue message `message_id`
    pub fn enrich(
        &self,
        event: &FailureEvent,
        message_id: &str,
    ) -> Result<EnrichedAlert, SchemaError> {
        event.validate()?;
        let host = event.host()?;
        let alert_id = event
            .idempotency_key()
            .unwrap_or_else(|| format!("{host}#msg-{message_id}"));

        Ok(EnrichedAlert {
            alert_id,
            severity: Severity::High,
            title: format!("API failure: {host}"),
            url: event.url.clone(),
            region: event.region.clone(),
            error_type: event.error_type.clone(),
            error_message: event.error_message.clone(),
            status_code: event.status_code,
            detected_at: event.timestamp,
            runbook_url: self.metadata.runbook_url.clone(),
            dashboard_url: self.metadata.dashboard_url.clone(),
            host,
        })
    }

    pub fn notification(alert: &EnrichedAlert) -> Result<Notification, serde_json::Error> {
        Ok(Notification {
            subject: format!("[{}] {}", alert.severity.as_str(), alert.title),
            message: serde_json::to_string(alert)?,
        })
    }

    /// Enrich and publish one queue delivery
    #[instrument(skip_all, fields(receipt = %delivery.receipt))]
    pub async fn dispatch(&self, delivery: &Delivery) -> Result<DispatchOutcome, DispatchError> {
        let event = FailureEvent::from_json(&delivery.body)?;
        let alert = self.enrich(&event, delivery.message_id())?;

        if self.published.lock().await.contains(&alert.alert_id) {
            debug!("alert {} already published, skipping", alert.alert_id);
            return Ok(DispatchOutcome::Duplicate);
        }

        let notification = Self::notification(&alert).map_err(PublishError::from)?;
        self.notifier.publish(&notification).await?;

        info!("published alert {}: {}", alert.alert_id, notification.subject);
        self.published.lock().await.put(alert.alert_id, ());
        Ok(DispatchOutcome::Published)
    }

    /// Process a batch of deliveries independently
    ///
    /// Successful (and duplicate) events are acknowledged; failed events are
    /// left for redelivery without affecting the rest of the batch.
    #[instrument(skip_all, fields(batch = deliveries.len()))]
    pub async fn process_batch(
        &self,
        queue: &dyn FailureQueue,
        deliveries: Vec<Delivery>,
    ) -> BatchReport {
        let outcomes = join_all(deliveries.iter().map(|d| self.dispatch(d))).await;

        let mut report = BatchReport::default();
        for (delivery, outcome) in deliveries.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => {
                    match outcome {
                        DispatchOutcome::Published => report.published += 1,
                        DispatchOutcome::Duplicate => report.duplicates += 1,
                    }
                    if let Err(e) = queue.ack(&delivery.receipt).await {
                        warn!("failed to acknowledge {}: {}", delivery.receipt, e);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "dispatch failed (delivery {} of message {}): {}",
                        delivery.receive_count, delivery.receipt, e
                    );
                }
            }
        }

        report
    }
}
