//! In-process failure queue
//!
//! Same delivery semantics as the SQLite queue, without durability. Uses
//! Tokio's clock so tests can drive visibility timeouts with
//! `tokio::time::pause`/`advance`.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Delivery, FailureQueue, QueuePolicy, parse_receipt, receipt_for};
use crate::error::QueueError;

#[derive(Debug)]
struct Message {
    id: u64,
    body: String,
    visible_at: Instant,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    messages: VecDeque<Message>,
    dead: Vec<String>,
}

pub struct MemoryQueue {
    policy: QueuePolicy,
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(State::default()),
        }
    }

    /// Number of messages not yet acknowledged or dead-lettered
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(QueuePolicy::default())
    }
}

#[async_trait]
impl FailureQueue for MemoryQueue {
    async fn send_raw(&self, body: String) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.messages.push_back(Message {
            id,
            body,
            visible_at: Instant::now(),
            receive_count: 0,
        });
        debug!("enqueued failure message {}", id);
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let max_receive_count = self.policy.max_receive_count;

        // Dead-letter visible messages that used up their deliveries
        let (exhausted, live): (VecDeque<Message>, VecDeque<Message>) =
            std::mem::take(&mut state.messages)
                .into_iter()
                .partition(|m| m.visible_at <= now && m.receive_count >= max_receive_count);
        state.messages = live;
        for message in exhausted {
            warn!(
                "dead-lettering message {} after {} deliveries",
                message.id, message.receive_count
            );
            state.dead.push(message.body);
        }

        let mut deliveries = Vec::new();
        for message in state.messages.iter_mut() {
            if deliveries.len() >= max {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            message.receive_count += 1;
            message.visible_at = now + self.policy.visibility_timeout;
            deliveries.push(Delivery {
                receipt: receipt_for(message.id, message.receive_count),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        let (id, receive_count) = parse_receipt(receipt)?;
        let mut state = self.state.lock().await;

        let position = state
            .messages
            .iter()
            .position(|m| m.id == id && m.receive_count == receive_count)
            .ok_or_else(|| QueueError::StaleReceipt(receipt.to_string()))?;
        state.messages.remove(position);
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<String>, QueueError> {
        Ok(self.state.lock().await.dead.clone())
    }
}
