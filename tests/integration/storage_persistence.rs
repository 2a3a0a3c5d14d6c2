//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - Records survive reopening the database
//! - The aggregator reads every page of a large partition
//! - The store and the failure queue share one database file
//! - Retention cleanup removes only expired records

use std::sync::Arc;

use api_monitor::aggregator::{AggregateQuery, MetricsAggregator};
use api_monitor::queue::sqlite::SqliteQueue;
use api_monitor::queue::{FailureQueue, QueuePolicy};
use api_monitor::schema::FailureEvent;
use api_monitor::storage::MetricsStore;
use api_monitor::storage::sqlite::SqliteStore;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::helpers::record;

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("metrics.db");
    let at = api_monitor::util::now_micros();
    let written = record("https://api.example.com/health", at, 200, 42.37);

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        store.put_record(written.clone()).await.unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteStore::new(&db_path).await.unwrap();
    let read = store
        .get_record("api.example.com", at)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, written);
    assert_eq!(read.latency_ms, 42.37);
}

#[tokio::test]
async fn test_aggregate_over_many_pages() {
    let temp_dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("metrics.db")).await.unwrap());
    let now = api_monitor::util::now_micros();

    for i in 0..25 {
        let status = if i % 5 == 0 { 500 } else { 200 };
        store
            .put_record(record(
                "https://api.example.com",
                now - Duration::seconds(i * 60),
                status,
                10.0,
            ))
            .await
            .unwrap();
        store
            .put_record(record(
                "https://other.example.com",
                now - Duration::seconds(i * 60),
                200,
                30.0,
            ))
            .await
            .unwrap();
    }

    let aggregator = MetricsAggregator::new(store).with_page_size(4);
    let (report, _) = aggregator
        .aggregate_at(&AggregateQuery::default(), now)
        .await
        .unwrap();

    assert_eq!(report.summary.total_checks, 50);
    assert_eq!(report.summary.uptime, 90.0);
    // (20 * 10ms + 25 * 30ms) / 45 successful checks
    assert_eq!(report.summary.average_latency, 21.11);
    assert_eq!(report.apis["api.example.com"].uptime, 80.0);
    assert_eq!(report.apis["other.example.com"].total_checks, 25);
}

#[tokio::test]
async fn test_store_and_queue_share_database() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("shared.db")).await.unwrap();
    let queue = SqliteQueue::new(store.pool(), QueuePolicy::default());

    let failed = record("https://api.example.com", Utc::now(), 502, 5.0);
    store.put_record(failed.clone()).await.unwrap();
    queue
        .send(&FailureEvent::from_record(&failed).unwrap())
        .await
        .unwrap();

    let deliveries = queue.receive(10).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    let event = FailureEvent::from_json(&deliveries[0].body).unwrap();
    assert_eq!(event.status_code, Some(502));
    assert_eq!(event.timestamp, Some(failed.timestamp));
    queue.ack(&deliveries[0].receipt).await.unwrap();

    assert!(store.health_check().await.unwrap().healthy);
}

#[tokio::test]
async fn test_retention_cleanup() {
    let temp_dir = tempdir().unwrap();
    let store = SqliteStore::new(temp_dir.path().join("metrics.db")).await.unwrap();
    let now = Utc::now();

    store
        .put_record(record("https://api.example.com", now - Duration::days(45), 200, 1.0))
        .await
        .unwrap();
    store
        .put_record(record("https://api.example.com", now - Duration::days(1), 200, 1.0))
        .await
        .unwrap();

    let deleted = store.cleanup_before(now - Duration::days(30)).await.unwrap();
    assert_eq!(deleted, 1);

    let partitions = store
        .list_partitions(now - Duration::days(60), now)
        .await
        .unwrap();
    assert_eq!(partitions, vec!["api.example.com".to_string()]);
}
