//! Metrics writer: best-effort persistence of probe records

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, instrument, trace, warn};

use crate::schema::ProbeRecord;
use crate::storage::{MetricsStore, PersistenceError};

/// Attempts at finding a free key before the record is given up on
const MAX_KEY_ATTEMPTS: u32 = 16;

/// Persists one probe record per invocation
///
/// Writing never fails from the caller's point of view: persistence errors
/// are logged and reported through the returned flag, so the alerting path
/// keeps running when the store is unavailable.
///
/// Targets on the same host share a partition. When two of their probes
/// start in the same microsecond the later record is moved forward by one
/// microsecond until its key is free; a record identical to the stored one
/// counts as already written.
#[derive(Clone)]
pub struct MetricsWriter {
    store: Arc<dyn MetricsStore>,
}

impl MetricsWriter {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Persist `record`, returning whether it reached the store
    ///
    /// On return `record.timestamp` is the key it was stored under.
    #[instrument(skip_all, fields(partition = %record.partition_key, success = record.success))]
    pub async fn write(&self, record: &mut ProbeRecord) -> bool {
        if let Err(e) = record.validate() {
            warn!("writing record that fails validation: {}", e);
        }

        for _ in 0..MAX_KEY_ATTEMPTS {
            match self.store.put_record(record.clone()).await {
                Ok(()) => {
                    trace!("record persisted at {}", record.timestamp);
                    return true;
                }
                Err(PersistenceError::Conflict { .. }) => {
                    match self
                        .store
                        .get_record(&record.partition_key, record.timestamp)
                        .await
                    {
                        Ok(Some(existing)) if existing == *record => {
                            debug!("record at {} already written", record.timestamp);
                            return true;
                        }
                        Ok(_) => {
                            debug!("key {} taken by another probe, shifting", record.timestamp);
                            record.timestamp += Duration::microseconds(1);
                        }
                        Err(e) => {
                            error!("failed to resolve key conflict for {}: {}", record.url, e);
                            return false;
                        }
                    }
                }
                Err(e) => {
                    error!("failed to persist probe record for {}: {}", record.url, e);
                    return false;
                }
            }
        }

        error!(
            "no free key for {} after {} attempts",
            record.url, MAX_KEY_ATTEMPTS
        );
        false
    }
}
