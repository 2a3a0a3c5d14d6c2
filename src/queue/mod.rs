//! Durable failure queue between the probers and the alert dispatcher
//!
//! ## Delivery semantics
//!
//! - **At least once**: a received message stays in the queue, invisible for
//!   the visibility timeout, until it is acknowledged with its receipt
//! - **Redelivery**: unacknowledged messages become visible again once the
//!   timeout elapses
//! - **Dead letters**: a message received `max_receive_count` times without
//!   being acknowledged is moved aside and no longer delivered
//!
//! Receipts are tied to one delivery. Acknowledging with the receipt of an
//! earlier delivery fails with `QueueError::StaleReceipt`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::schema::FailureEvent;

pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use memory::MemoryQueue;

/// Visibility and dead-letter policy of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// How long a received message stays hidden from other receivers
    pub visibility_timeout: Duration,

    /// Deliveries after which an unacknowledged message is dead-lettered
    pub max_receive_count: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 5,
        }
    }
}

/// One delivery of a queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle for acknowledging this delivery
    pub receipt: String,

    /// Raw message body (JSON-encoded failure event)
    pub body: String,

    /// How many times the message has been delivered, including this one
    pub receive_count: u32,
}

impl Delivery {
    /// Identity of the queued message, shared by all of its deliveries
    pub fn message_id(&self) -> &str {
        self.receipt
            .split_once(':')
            .map_or(self.receipt.as_str(), |(id, _)| id)
    }
}

pub(crate) fn receipt_for(id: u64, receive_count: u32) -> String {
    format!("{id}:{receive_count}")
}

pub(crate) fn parse_receipt(receipt: &str) -> Result<(u64, u32), QueueError> {
    let (id, count) = receipt
        .split_once(':')
        .ok_or_else(|| QueueError::StaleReceipt(receipt.to_string()))?;
    let id = id
        .parse()
        .map_err(|_| QueueError::StaleReceipt(receipt.to_string()))?;
    let count = count
        .parse()
        .map_err(|_| QueueError::StaleReceipt(receipt.to_string()))?;
    Ok((id, count))
}

#[async_trait]
pub trait FailureQueue: Send + Sync {
    /// Enqueue a raw message body
    async fn send_raw(&self, body: String) -> Result<(), QueueError>;

    /// Receive up to `max` visible messages
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError>;

    /// Remove a delivered message from the queue
    async fn ack(&self, receipt: &str) -> Result<(), QueueError>;

    /// Bodies of messages that exhausted their deliveries
    async fn dead_letters(&self) -> Result<Vec<String>, QueueError>;

    /// Enqueue a failure event
    async fn send(&self, event: &FailureEvent) -> Result<(), QueueError> {
        let body = serde_json::to_string(event)?;
        self.send_raw(body).await
    }
}
