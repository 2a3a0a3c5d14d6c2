//! Storage backend trait definition
//!
//! This module defines the `MetricsStore` trait that all probe record
//! stores implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::schema::ProbeRecord;

/// Default number of records returned per page
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Key-range query over one partition
#[derive(Debug, Clone)]
pub struct RangeQuery {
    /// Partition to query (the target's host name)
    pub partition_key: String,

    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of records per page
    pub page_size: usize,
}

impl RangeQuery {
    pub fn new(partition_key: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            partition_key: partition_key.into(),
            start,
            end,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Position after the last record of a page
///
/// The next page starts strictly after this timestamp. Timestamps are unique
/// within a partition, so no record is skipped or repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(pub DateTime<Utc>);

/// One page of a range query, ordered by timestamp (oldest first)
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<ProbeRecord>,

    /// `Some` when more records may follow
    pub next: Option<PageCursor>,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Append-only store for probe records
///
/// Implementations must be `Send + Sync`; one store instance is shared by
/// every prober, the aggregator and the retention task.
///
/// ## Keys
///
/// Records are keyed by `(partition_key, timestamp)`. Writing a key that
/// already exists fails with `PersistenceError::Conflict` rather than
/// overwriting, so concurrent writers can never clobber each other.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Persist a new record
    async fn put_record(&self, record: ProbeRecord) -> StorageResult<()>;

    /// Fetch one record by its key
    async fn get_record(
        &self,
        partition_key: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<Option<ProbeRecord>>;

    /// Partitions that have at least one record within `[start, end]`
    async fn list_partitions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<String>>;

    /// Fetch one page of a key-range query
    ///
    /// Pass `None` for the first page and the returned `next` cursor for
    /// subsequent pages.
    async fn query_page(
        &self,
        query: &RangeQuery,
        cursor: Option<PageCursor>,
    ) -> StorageResult<RecordPage>;

    /// Delete records older than `before`, returning the number deleted
    ///
    /// Used for retention policy enforcement only.
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
