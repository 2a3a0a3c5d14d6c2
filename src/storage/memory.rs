//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Deployments that only need the live alerting path
//!
//! All data is lost on restart.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, MetricsStore, PageCursor, RangeQuery, RecordPage};
use super::error::{PersistenceError, StorageResult};
use crate::schema::ProbeRecord;

/// In-memory storage backend
///
/// Records are held per partition in a `BTreeMap` keyed by the timestamp in
/// microseconds, which gives ordered range scans for free.
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, BTreeMap<i64, ProbeRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(BTreeMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn put_record(&self, record: ProbeRecord) -> StorageResult<()> {
        let key = record.timestamp.timestamp_micros();
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(record.partition_key.clone()).or_default();

        if partition.contains_key(&key) {
            return Err(PersistenceError::Conflict {
                partition_key: record.partition_key,
                timestamp: record.timestamp.to_rfc3339(),
            });
        }

        trace!(
            "stored record for {} at {}",
            record.partition_key, record.timestamp
        );
        partition.insert(key, record);
        Ok(())
    }

    async fn get_record(
        &self,
        partition_key: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<Option<ProbeRecord>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(partition_key)
            .and_then(|p| p.get(&timestamp.timestamp_micros()))
            .cloned())
    }

    async fn list_partitions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let (start, end) = (start.timestamp_micros(), end.timestamp_micros());
        let partitions = self.partitions.read().await;

        let mut keys: Vec<String> = partitions
            .iter()
            .filter(|(_, records)| start <= end && records.range(start..=end).next().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn query_page(
        &self,
        query: &RangeQuery,
        cursor: Option<PageCursor>,
    ) -> StorageResult<RecordPage> {
        debug!("querying in-memory storage for {}", query.partition_key);

        let end = query.end.timestamp_micros();
        let (lower, lower_value) = match cursor {
            Some(PageCursor(after)) => {
                let after = after.timestamp_micros();
                (Bound::Excluded(after), after)
            }
            None => {
                let start = query.start.timestamp_micros();
                (Bound::Included(start), start)
            }
        };
        // BTreeMap::range panics on inverted bounds
        if lower_value > end {
            return Ok(RecordPage::default());
        }

        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(&query.partition_key) else {
            return Ok(RecordPage::default());
        };

        // Fetch one extra record to know whether another page follows
        let mut records: Vec<ProbeRecord> = partition
            .range((lower, Bound::Included(end)))
            .take(query.page_size + 1)
            .map(|(_, record)| record.clone())
            .collect();

        let next = if records.len() > query.page_size {
            records.truncate(query.page_size);
            records.last().map(|r| PageCursor(r.timestamp))
        } else {
            None
        };

        Ok(RecordPage { records, next })
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let cutoff = before.timestamp_micros();
        let mut partitions = self.partitions.write().await;
        let mut deleted = 0;

        for records in partitions.values_mut() {
            let kept = records.split_off(&cutoff);
            deleted += records.len();
            *records = kept;
        }
        partitions.retain(|_, records| !records.is_empty());

        debug!("in-memory cleanup removed {} records", deleted);
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let total = self.len().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_records".to_string(), total.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
