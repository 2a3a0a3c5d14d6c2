//! Prober: one outbound HTTP GET per invocation
//!
//! ## Flow
//!
//! ```text
//! ProbeTarget → Prober::probe → ProbeRecord → MetricsWriter (best effort)
//!                                    │
//!                                    └── failed? → FailureEvent → FailureQueue
//! ```
//!
//! No retries: a probe that times out or cannot connect yields exactly one
//! failure record and one failure event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument, trace, warn};

use crate::error::NetworkError;
use crate::queue::FailureQueue;
use crate::schema::{FailureEvent, ProbeRecord, ProbeResponse, ProbeTarget, SslInfo};
use crate::util::{now_micros, round2};
use crate::writer::MetricsWriter;

/// Fixed timeout for one probe, connection setup included
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one probe before it is turned into a record
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Wall-clock instant the request was started
    pub timestamp: DateTime<Utc>,
    /// Monotonic latency in milliseconds, rounded to two decimals
    pub latency_ms: f64,
    pub result: Result<ProbeResponse, NetworkError>,
}

/// HTTP prober
///
/// Holds one reqwest client, reused across probes.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("api-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Probe `url` once
    ///
    /// Latency covers connection setup, the response head and the full body.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let timestamp = now_micros();
        let start = Instant::now();
        let result = self.execute(url).await;
        let latency_ms = round2(start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(response) => trace!(
                "{} answered {} in {}ms",
                url, response.status_code, latency_ms
            ),
            Err(e) => debug!("probe of {} failed after {}ms: {}", url, latency_ms, e),
        }

        ProbeOutcome {
            timestamp,
            latency_ms,
            result,
        }
    }

    async fn execute(&self, url: &str) -> Result<ProbeResponse, NetworkError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e))?;

        let status_code = response.status().as_u16();

        // Rustls rejects untrusted certificates during the handshake, so a
        // completed https exchange is an authorized one.
        let ssl_info = (response.url().scheme() == "https").then_some(SslInfo { authorized: true });

        // Count the body without buffering it
        let mut response_size = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e))?
        {
            response_size += chunk.len() as u64;
        }

        Ok(ProbeResponse {
            status_code,
            response_size,
            ssl_info,
        })
    }
}

/// What one scheduled invocation did
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub record: ProbeRecord,
    /// Whether the record reached the store
    pub persisted: bool,
    /// Whether a failure event was placed on the queue
    pub failure_enqueued: bool,
}

/// Probe, persist, and report failures for one target
///
/// All collaborators are injected; nothing is shared between invocations
/// except these handles.
#[derive(Clone)]
pub struct ProbeInvocation {
    prober: Prober,
    writer: MetricsWriter,
    queue: Arc<dyn FailureQueue>,
}

impl ProbeInvocation {
    pub fn new(prober: Prober, writer: MetricsWriter, queue: Arc<dyn FailureQueue>) -> Self {
        Self {
            prober,
            writer,
            queue,
        }
    }

    #[instrument(skip(self), fields(url = %target.url, region = %target.region))]
    pub async fn run(&self, target: &ProbeTarget) -> ProbeReport {
        let partition_key = target.partition_key().unwrap_or_else(|e| {
            warn!("target has no usable host, keying by url: {}", e);
            target.url.to_lowercase()
        });

        let outcome = self.prober.probe(&target.url).await;
        let mut record = ProbeRecord::from_outcome(
            partition_key,
            target,
            outcome.timestamp,
            outcome.latency_ms,
            &outcome.result,
        );

        // The failure path runs whether or not the write went through, and
        // keys the event by the timestamp the record was stored under
        let persisted = self.writer.write(&mut record).await;

        let failure_enqueued = match FailureEvent::from_record(&record) {
            Some(event) => match self.queue.send(&event).await {
                Ok(()) => {
                    debug!("queued failure event: {}", event.error_type);
                    true
                }
                Err(e) => {
                    error!("failed to queue failure event for {}: {}", target.url, e);
                    false
                }
            },
            None => false,
        };

        ProbeReport {
            record,
            persisted,
            failure_enqueued,
        }
    }
}
