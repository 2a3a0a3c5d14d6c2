//! Record and message shapes that cross component boundaries
//!
//! ## Probe Record
//!
//! One observation of one target at one instant, keyed by
//! `(partition_key, timestamp)`. Records are append-only: the writer never
//! updates or deletes them (retention cleanup aside).
//!
//! ## Failure Event
//!
//! A transient queue message derived from a failed probe record. The queue
//! delivers it at least once, so everything derived from it (the alert id,
//! the alert body) is a pure function of the event and the queue message
//! that carried it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, SchemaError};
use crate::util::truncate_micros;

/// `error_type` used for completed exchanges with a non-2xx status
pub const HTTP_STATUS_ERROR: &str = "HTTP_STATUS";

/// Status code sentinel: no HTTP response was received
pub const NO_RESPONSE: u16 = 0;

/// Whether a status code counts as a successful probe
pub fn is_success_status(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

/// Derive the partition key for a target URL (its lowercased host name)
pub fn partition_key_for(url: &str) -> Result<String, SchemaError> {
    let parsed = url::Url::parse(url).map_err(|e| SchemaError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(host.to_lowercase()),
        _ => Err(SchemaError::InvalidUrl {
            url: url.to_string(),
            reason: "url has no host".to_string(),
        }),
    }
}

/// A monitored endpoint as handed to the prober by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub url: String,
    pub region: String,
}

impl ProbeTarget {
    pub fn new(url: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            region: region.into(),
        }
    }

    pub fn partition_key(&self) -> Result<String, SchemaError> {
        partition_key_for(&self.url)
    }
}

/// TLS details of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslInfo {
    /// Whether the peer certificate was accepted by the client's trust store
    pub authorized: bool,
}

/// Outcome of a completed HTTP exchange (any status code)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
    /// Bytes of body received
    pub response_size: u64,
    /// `None` for plain-text HTTP targets
    pub ssl_info: Option<SslInfo>,
}

/// One observation of one target at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRecord {
    pub partition_key: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub region: String,
    pub status_code: u16,
    pub latency_ms: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_info: Option<SslInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProbeRecord {
    /// Build the single record for one probe attempt
    ///
    /// Completed exchanges keep their status code; a non-2xx status is a
    /// failure with `error_type = HTTP_STATUS`. Network failures use the
    /// `0` status sentinel and carry the error classification.
    pub fn from_outcome(
        partition_key: String,
        target: &ProbeTarget,
        timestamp: DateTime<Utc>,
        latency_ms: f64,
        outcome: &Result<ProbeResponse, NetworkError>,
    ) -> Self {
        let base = Self {
            partition_key,
            timestamp: truncate_micros(timestamp),
            url: target.url.clone(),
            region: target.region.clone(),
            status_code: NO_RESPONSE,
            latency_ms,
            success: false,
            response_size: None,
            ssl_info: None,
            error_type: None,
            error_message: None,
        };

        match outcome {
            Ok(response) => {
                let success = is_success_status(response.status_code);
                Self {
                    status_code: response.status_code,
                    success,
                    response_size: Some(response.response_size),
                    ssl_info: response.ssl_info.clone(),
                    error_type: (!success).then(|| HTTP_STATUS_ERROR.to_string()),
                    error_message: (!success)
                        .then(|| format!("unexpected status code {}", response.status_code)),
                    ..base
                }
            }
            Err(err) => Self {
                error_type: Some(err.kind.as_str().to_string()),
                error_message: Some(err.message.clone()),
                ..base
            },
        }
    }

    /// Check the invariants every stored record must satisfy
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.partition_key.trim().is_empty() {
            return Err(SchemaError::MissingField("partitionKey"));
        }
        if self.url.trim().is_empty() {
            return Err(SchemaError::MissingField("url"));
        }
        if !self.latency_ms.is_finite() || self.latency_ms < 0.0 {
            return Err(SchemaError::Inconsistent(format!(
                "latency {} is not a non-negative number",
                self.latency_ms
            )));
        }
        if self.success != is_success_status(self.status_code) {
            return Err(SchemaError::Inconsistent(format!(
                "success={} does not match status code {}",
                self.success, self.status_code
            )));
        }
        if !self.success && self.error_message.as_deref().is_none_or(str::is_empty) {
            return Err(SchemaError::MissingField("errorMessage"));
        }
        Ok(())
    }
}

/// Message placed on the failure queue for one failed probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    pub url: String,
    pub region: String,
    pub error_type: String,
    pub error_message: String,
    /// Timestamp of the failed record, absent in minimal producer payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl FailureEvent {
    /// Derive the failure event for a record, `None` for successful probes
    pub fn from_record(record: &ProbeRecord) -> Option<Self> {
        if record.success {
            return None;
        }

        Some(Self {
            url: record.url.clone(),
            region: record.region.clone(),
            error_type: record
                .error_type
                .clone()
                .unwrap_or_else(|| HTTP_STATUS_ERROR.to_string()),
            error_message: record
                .error_message
                .clone()
                .unwrap_or_else(|| format!("probe failed with status {}", record.status_code)),
            timestamp: Some(record.timestamp),
            status_code: Some(record.status_code),
        })
    }

    /// Parse and validate a queue message body
    pub fn from_json(body: &str) -> Result<Self, SchemaError> {
        let event: FailureEvent = serde_json::from_str(body)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.url.trim().is_empty() {
            return Err(SchemaError::MissingField("url"));
        }
        if self.error_type.trim().is_empty() {
            return Err(SchemaError::MissingField("errorType"));
        }
        partition_key_for(&self.url)?;
        Ok(())
    }

    /// Host name of the failed target
    pub fn host(&self) -> Result<String, SchemaError> {
        partition_key_for(&self.url)
    }

    /// Stable identifier for deduplicating redelivered events
    ///
    /// Only events that carry the originating record's timestamp can be told
    /// apart by content. Two failures of the same target with the same error
    /// at different times are otherwise indistinguishable, so no key is
    /// derived for them and the caller keys by queue message instead.
    pub fn idempotency_key(&self) -> Option<String> {
        let ts = self.timestamp?;
        let host = partition_key_for(&self.url).unwrap_or_else(|_| self.url.clone());
        Some(format!("{host}#{}", ts.timestamp_micros()))
    }
}
