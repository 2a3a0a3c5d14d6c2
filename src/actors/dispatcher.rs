//! DispatcherActor - drains the failure queue into the alert fan-out
//!
//! ```text
//! Timer tick → FailureQueue::receive → AlertDispatcher::process_batch → ack
//!     ↑
//!     └─── Commands (DrainNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{AlertDispatcher, BatchReport};
use crate::queue::FailureQueue;

use super::messages::DispatcherCommand;

pub struct DispatcherActor {
    queue: Arc<dyn FailureQueue>,
    dispatcher: Arc<AlertDispatcher>,
    batch_size: usize,
    poll_interval: Duration,
    command_rx: mpsc::Receiver<DispatcherCommand>,
}

impl DispatcherActor {
    pub fn new(
        queue: Arc<dyn FailureQueue>,
        dispatcher: Arc<AlertDispatcher>,
        batch_size: usize,
        poll_interval: Duration,
        command_rx: mpsc::Receiver<DispatcherCommand>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            batch_size: batch_size.max(1),
            poll_interval,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting dispatcher actor");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain().await {
                        error!("failed to drain failure queue: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DispatcherCommand::DrainNow { respond_to } => {
                            debug!("received DrainNow command");
                            let _ = respond_to.send(self.drain().await);
                        }

                        DispatcherCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("dispatcher actor stopped");
    }

    /// Receive and process one batch
    async fn drain(&self) -> Result<BatchReport> {
        let deliveries = self
            .queue
            .receive(self.batch_size)
            .await
            .context("failed to receive from failure queue")?;

        if deliveries.is_empty() {
            trace!("failure queue empty");
            return Ok(BatchReport::default());
        }

        let report = self
            .dispatcher
            .process_batch(self.queue.as_ref(), deliveries)
            .await;

        info!(
            "dispatched batch: {} published, {} duplicates, {} failed",
            report.published, report.duplicates, report.failed
        );
        Ok(report)
    }
}

#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    pub fn spawn(
        queue: Arc<dyn FailureQueue>,
        dispatcher: Arc<AlertDispatcher>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = DispatcherActor::new(queue, dispatcher, batch_size, poll_interval, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Process one batch now and return its counters
    pub async fn drain_now(&self) -> Result<BatchReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatcherCommand::DrainNow { respond_to: tx })
            .await
            .context("dispatcher actor is gone")?;

        rx.await.context("dispatcher actor dropped the request")?
    }

    /// Stop the actor and wait until it has exited
    pub async fn shutdown(self) {
        let _ = self.sender.send(DispatcherCommand::Shutdown).await;
        self.sender.closed().await;
    }
}
