//! RetentionActor - deletes probe records older than the retention period

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::storage::MetricsStore;

use super::messages::RetentionCommand;

/// Cleanup interval - run retention cleanup daily
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct RetentionActor {
    store: Arc<dyn MetricsStore>,
    retention_days: u32,
    cleanup_interval: Duration,
    command_rx: mpsc::Receiver<RetentionCommand>,
}

impl RetentionActor {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        retention_days: u32,
        cleanup_interval: Duration,
        command_rx: mpsc::Receiver<RetentionCommand>,
    ) -> Self {
        Self {
            store,
            retention_days,
            cleanup_interval,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(retention_days = self.retention_days))]
    pub async fn run(mut self) {
        debug!("starting retention actor");

        // First tick fires immediately: cleanup on startup
        let mut ticker = interval(self.cleanup_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup().await {
                        // Retried on the next interval
                        error!("retention cleanup failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetentionCommand::CleanupNow { respond_to } => {
                            let _ = respond_to.send(self.cleanup().await);
                        }

                        RetentionCommand::Shutdown => {
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

        debug!("retention actor stopped");
    }

    async fn cleanup(&self) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.retention_days));
        debug!("running retention cleanup (deleting records before {})", cutoff);

        let deleted = self
            .store
            .cleanup_before(cutoff)
            .await
            .context("failed to delete expired records")?;

        if deleted > 0 {
            info!("retention cleanup complete: deleted {} old records", deleted);
        } else {
            trace!("retention cleanup: no old records to delete");
        }
        Ok(deleted)
    }
}

#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(store: Arc<dyn MetricsStore>, retention_days: u32, cleanup_interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        tokio::spawn(RetentionActor::new(store, retention_days, cleanup_interval, cmd_rx).run());
        Self { sender: cmd_tx }
    }

    pub async fn cleanup_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::CleanupNow { respond_to: tx })
            .await
            .context("retention actor is gone")?;
        rx.await.context("retention actor dropped the request")?
    }

    /// Stop the actor and wait until it has exited
    pub async fn shutdown(self) {
        let _ = self.sender.send(RetentionCommand::Shutdown).await;
        self.sender.closed().await;
    }
}
