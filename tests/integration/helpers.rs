//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use api_monitor::error::PublishError;
use api_monitor::notify::{Notification, Notifier};
use api_monitor::schema::{ProbeRecord, ProbeResponse, ProbeTarget};
use api_monitor::storage::{
    HealthStatus, MetricsStore, PageCursor, PersistenceError, RangeQuery, RecordPage,
    StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Record for `url` at `at` with the given status code
pub fn record(url: &str, at: DateTime<Utc>, status_code: u16, latency_ms: f64) -> ProbeRecord {
    let target = ProbeTarget::new(url, "eu-west-1");
    ProbeRecord::from_outcome(
        target.partition_key().unwrap(),
        &target,
        at,
        latency_ms,
        &Ok(ProbeResponse {
            status_code,
            response_size: 128,
            ssl_info: None,
        }),
    )
}

/// Notifier that remembers what it was asked to publish
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl MetricsStore for FailingStore {
    async fn put_record(&self, _: ProbeRecord) -> StorageResult<()> {
        Err(PersistenceError::ConnectionFailed("store offline".to_string()))
    }

    async fn get_record(&self, _: &str, _: DateTime<Utc>) -> StorageResult<Option<ProbeRecord>> {
        Err(PersistenceError::ConnectionFailed("store offline".to_string()))
    }

    async fn list_partitions(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> StorageResult<Vec<String>> {
        Err(PersistenceError::ConnectionFailed("store offline".to_string()))
    }

    async fn query_page(&self, _: &RangeQuery, _: Option<PageCursor>) -> StorageResult<RecordPage> {
        Err(PersistenceError::ConnectionFailed("store offline".to_string()))
    }

    async fn cleanup_before(&self, _: DateTime<Utc>) -> StorageResult<usize> {
        Err(PersistenceError::ConnectionFailed("store offline".to_string()))
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Err(PersistenceError::ConnectionFailed("store offline".to_string()))
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
