//! Integration tests for the probe side of the pipeline
//!
//! These tests verify that:
//! - Every probe produces exactly one record
//! - Failed probes produce one failure event with the probed url
//! - A failing store does not stop the failure path

use std::sync::Arc;

use api_monitor::error::NetworkErrorKind;
use api_monitor::prober::{ProbeInvocation, Prober};
use api_monitor::queue::{FailureQueue, MemoryQueue};
use api_monitor::schema::{FailureEvent, NO_RESPONSE, ProbeTarget};
use api_monitor::storage::{MemoryStore, MetricsStore};
use api_monitor::writer::MetricsWriter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::FailingStore;

fn invocation(store: Arc<dyn MetricsStore>, queue: Arc<dyn FailureQueue>) -> ProbeInvocation {
    ProbeInvocation::new(Prober::new().unwrap(), MetricsWriter::new(store), queue)
}

#[tokio::test]
async fn test_healthy_target_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::default());
    let report = invocation(store.clone(), queue.clone())
        .run(&ProbeTarget::new(format!("{}/status", server.uri()), "eu-west-1"))
        .await;

    let record = &report.record;
    assert_eq!(record.status_code, 200);
    assert!(record.success);
    assert_eq!(record.response_size, Some(11));
    assert_eq!(record.error_type, None);
    assert!(record.latency_ms >= 0.0);
    assert_eq!(record.region, "eu-west-1");

    // Serialized shape seen by consumers of the store
    let json = serde_json::to_value(record).unwrap();
    assert_eq!(json["statusCode"], 200);
    assert_eq!(json["success"], true);
    assert!(json.get("errorMessage").is_none());

    assert_eq!(store.len().await, 1);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_unreachable_host_produces_one_failure_event() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::default());
    let url = "http://127.0.0.1:1/health";

    let report = invocation(store.clone(), queue.clone())
        .run(&ProbeTarget::new(url, "us-east-1"))
        .await;

    assert_eq!(report.record.status_code, NO_RESPONSE);
    assert!(!report.record.success);
    assert_eq!(
        report.record.error_type.as_deref(),
        Some(NetworkErrorKind::ConnectionRefused.as_str())
    );
    assert!(!report.record.error_message.as_deref().unwrap().is_empty());
    assert!(report.failure_enqueued);
    assert_eq!(store.len().await, 1);

    let deliveries = queue.receive(10).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    let event = FailureEvent::from_json(&deliveries[0].body).unwrap();
    assert_eq!(event.url, url);
    assert_eq!(event.region, "us-east-1");
    assert_eq!(event.error_type, "CONNECTION_REFUSED");
}

#[tokio::test]
async fn test_repeated_probes_write_one_record_each() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::default());
    let invocation = invocation(store.clone(), queue.clone());
    let target = ProbeTarget::new(server.uri(), "local");

    for _ in 0..3 {
        invocation.run(&target).await;
    }

    assert_eq!(store.len().await, 3);
    assert_eq!(queue.len().await, 3);
}

#[tokio::test]
async fn test_store_failure_does_not_block_failure_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let queue = Arc::new(MemoryQueue::default());
    let report = invocation(Arc::new(FailingStore), queue.clone())
        .run(&ProbeTarget::new(server.uri(), "local"))
        .await;

    assert!(!report.persisted);
    assert!(report.failure_enqueued);
    assert_eq!(queue.len().await, 1);
}
