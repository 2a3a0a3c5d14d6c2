use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{instrument, warn};

use super::{Notification, Notifier};
use crate::error::PublishError;

/// Publishes to every subscriber concurrently
///
/// The publish succeeds only when all subscribers accepted the message.
/// Subscribers that did accept will see it again on redelivery.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    subscribers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(subscribers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { subscribers }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    #[instrument(skip_all, fields(subscribers = self.subscribers.len()))]
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        if self.subscribers.is_empty() {
            warn!("no subscribers configured, dropping notification: {}", notification.subject);
            return Ok(());
        }

        let results = join_all(self.subscribers.iter().map(|s| s.publish(notification))).await;

        let total = results.len();
        let mut errors = results.into_iter().filter_map(Result::err);
        let Some(first) = errors.next() else {
            return Ok(());
        };
        let failed = 1 + errors.count();

        warn!("{} of {} subscribers failed: {}", failed, total, first);
        Err(PublishError::Partial {
            failed,
            total,
            first: Box::new(first),
        })
    }
}
