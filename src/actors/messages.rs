//! Command types for actor communication
//!
//! Every actor owns an mpsc command receiver. Commands that need an answer
//! carry a oneshot sender.

use tokio::sync::oneshot;

use crate::alerts::BatchReport;
use crate::prober::ProbeReport;

/// Commands that can be sent to a ProberActor
#[derive(Debug)]
pub enum ProberCommand {
    /// Probe immediately, bypassing the interval timer
    ProbeNow {
        respond_to: oneshot::Sender<ProbeReport>,
    },

    /// Change the probe interval
    ///
    /// The ticker restarts with its first tick one full interval away, so
    /// changing the interval never triggers a probe by itself.
    UpdateInterval { interval_secs: u64 },

    /// Stop after the in-flight probe, if any
    Shutdown,
}

/// Commands that can be sent to the DispatcherActor
#[derive(Debug)]
pub enum DispatcherCommand {
    /// Receive and process one batch now
    DrainNow {
        respond_to: oneshot::Sender<anyhow::Result<BatchReport>>,
    },

    Shutdown,
}

/// Commands that can be sent to the RetentionActor
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run cleanup now, answering with the number of deleted records
    CleanupNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    Shutdown,
}
