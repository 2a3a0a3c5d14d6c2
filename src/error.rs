//! Error taxonomy for the monitoring pipeline
//!
//! - [`NetworkError`]: the prober could not complete the HTTP exchange
//! - [`crate::storage::PersistenceError`]: a store read or write failed
//! - [`QueryError`]: the aggregator could not answer a read request
//! - [`PublishError`]: the notification fan-out rejected a message
//! - [`SchemaError`]: a payload crossing a component boundary is malformed
//! - [`QueueError`]: the failure queue rejected an operation

use std::fmt;

use thiserror::Error;

use crate::storage::PersistenceError;

/// Classification of a failed HTTP exchange
///
/// The string form is what ends up in `error_type` of a probe record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    /// No response within the probe timeout
    Timeout,
    /// Host name could not be resolved
    Dns,
    /// TCP connection could not be established
    ConnectionRefused,
    /// Connection dropped mid-exchange
    ConnectionReset,
    /// TLS handshake failed (includes untrusted certificates)
    Tls,
    /// Response body could not be read to the end
    Body,
    /// Anything else reqwest reports while building or sending the request
    Request,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkErrorKind::Timeout => "TIMEOUT",
            NetworkErrorKind::Dns => "DNS_FAILURE",
            NetworkErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            NetworkErrorKind::ConnectionReset => "CONNECTION_RESET",
            NetworkErrorKind::Tls => "TLS_FAILURE",
            NetworkErrorKind::Body => "BODY_READ_FAILED",
            NetworkErrorKind::Request => "REQUEST_FAILED",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The prober could not complete the HTTP exchange
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("request failed ({})", kind.as_str().to_lowercase())
        } else {
            message
        };
        Self { kind, message }
    }

    /// Classify a reqwest error by its flags and its source chain
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let chain = error_chain(err);
        let lowered = chain.to_lowercase();

        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
            NetworkErrorKind::Dns
        } else if lowered.contains("certificate") || lowered.contains("tls") {
            NetworkErrorKind::Tls
        } else if lowered.contains("connection reset") || lowered.contains("broken pipe") {
            NetworkErrorKind::ConnectionReset
        } else if err.is_connect() {
            NetworkErrorKind::ConnectionRefused
        } else if err.is_body() || err.is_decode() {
            NetworkErrorKind::Body
        } else {
            NetworkErrorKind::Request
        };

        Self::new(kind, chain)
    }
}

/// Render an error and all of its sources as `outer: inner: innermost`
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = inner.source();
    }
    parts.join(": ")
}

/// A payload crossing a component boundary failed validation
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("inconsistent record: {0}")]
    Inconsistent(String),
}

/// The aggregator could not answer a read request
///
/// Distinct from an empty result: zero records is a successful report.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid lookback window of {hours} hours (allowed: 1..={max})")]
    InvalidWindow { hours: u32, max: u32 },

    #[error("invalid target filter: {0}")]
    InvalidFilter(#[source] SchemaError),

    #[error("metrics query failed: {0}")]
    Store(#[from] PersistenceError),
}

/// The notification fan-out rejected a message
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("subscriber `{subscriber}` rejected the notification with status {status}")]
    Rejected { subscriber: String, status: u16 },

    #[error("failed to reach subscriber `{subscriber}`: {source}")]
    Transport {
        subscriber: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{failed} of {total} subscribers failed, first error: {first}")]
    Partial {
        failed: usize,
        total: usize,
        #[source]
        first: Box<PublishError>,
    },
}

/// The failure queue rejected an operation
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to encode failure event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("receipt `{0}` is unknown or no longer valid")]
    StaleReceipt(String),

    #[error("queue backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::Backend(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for QueueError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        QueueError::Backend(format!("migration failed: {err}"))
    }
}
