//! ProberActor - probes one target on a fixed schedule
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → ProbeInvocation::run → record written, failure event queued
//!     ↑
//!     └─── Commands (ProbeNow, UpdateInterval, Shutdown)
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, warn};

use crate::prober::{ProbeInvocation, ProbeReport};
use crate::schema::ProbeTarget;

use super::messages::ProberCommand;

/// Actor that probes a single target
///
/// Each target gets its own actor, so a slow target never delays another.
pub struct ProberActor {
    target: ProbeTarget,
    invocation: ProbeInvocation,
    command_rx: mpsc::Receiver<ProberCommand>,
    interval_duration: Duration,
}

impl ProberActor {
    pub fn new(
        target: ProbeTarget,
        invocation: ProbeInvocation,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<ProberCommand>,
    ) -> Self {
        Self {
            target,
            invocation,
            command_rx,
            interval_duration,
        }
    }

    /// Ticker whose first tick fires at `start`
    fn ticker(&self, start: Instant) -> tokio::time::Interval {
        let mut ticker = interval_at(start, self.interval_duration);
        // A probe slower than the interval must not cause a burst afterwards
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Run until Shutdown or until every handle is dropped
    #[instrument(skip(self), fields(url = %self.target.url))]
    pub async fn run(mut self) {
        debug!("starting prober actor");

        let mut ticker = self.ticker(Instant::now());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.invocation.run(&self.target).await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ProberCommand::ProbeNow { respond_to } => {
                            debug!("received ProbeNow command");
                            let report = self.invocation.run(&self.target).await;
                            let _ = respond_to.send(report);
                        }

                        ProberCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = self.ticker(Instant::now() + self.interval_duration);
                        }

                        ProberCommand::Shutdown => {
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

        debug!("prober actor stopped");
    }
}

/// Handle for controlling a ProberActor
#[derive(Clone)]
pub struct ProberHandle {
    sender: mpsc::Sender<ProberCommand>,
    target: ProbeTarget,
}

impl ProberHandle {
    pub fn spawn(target: ProbeTarget, invocation: ProbeInvocation, interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = ProberActor::new(target.clone(), invocation, interval, cmd_rx);

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            target,
        }
    }

    /// Probe immediately and wait for the result
    pub async fn probe_now(&self) -> Result<ProbeReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ProberCommand::ProbeNow { respond_to: tx })
            .await
            .context("prober actor is gone")?;

        rx.await.context("prober actor dropped the request")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(ProberCommand::UpdateInterval { interval_secs })
            .await?;
        Ok(())
    }

    /// Stop the actor and wait until it has exited
    ///
    /// A probe already in flight finishes, including its write, before this
    /// returns.
    pub async fn shutdown(self) {
        let _ = self.sender.send(ProberCommand::Shutdown).await;
        self.sender.closed().await;
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }
}
