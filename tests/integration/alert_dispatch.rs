//! Integration tests for alert dispatch
//!
//! These tests verify that:
//! - A failed probe ends up as one published alert naming the host
//! - Redelivered events are not published twice
//! - Repeated failures of one target each raise an alert
//! - Publish failures leave the event on the queue for redelivery
//! - Poison messages end up in the dead letters

use std::sync::Arc;
use std::time::Duration;

use api_monitor::actors::DispatcherHandle;
use api_monitor::alerts::{AlertDispatcher, DispatchOutcome, EnrichedAlert, Severity};
use api_monitor::config::AlertMetadata;
use api_monitor::notify::{FanoutNotifier, Notifier, WebhookNotifier};
use api_monitor::prober::{ProbeInvocation, Prober};
use api_monitor::queue::{FailureQueue, MemoryQueue, QueuePolicy};
use api_monitor::schema::{FailureEvent, ProbeTarget};
use api_monitor::storage::MemoryStore;
use api_monitor::writer::MetricsWriter;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::RecordingNotifier;

fn failure_event() -> FailureEvent {
    FailureEvent {
        url: "https://api.example.com/v1/health".to_string(),
        region: "eu-west-1".to_string(),
        error_type: "TIMEOUT".to_string(),
        error_message: "operation timed out".to_string(),
        timestamp: None,
        status_code: None,
    }
}

#[tokio::test]
async fn test_published_subject_contains_host() {
    let queue = MemoryQueue::default();
    queue.send(&failure_event()).await.unwrap();

    let notifier = RecordingNotifier::new();
    let dispatcher = AlertDispatcher::new(notifier.clone(), AlertMetadata::default());

    let report = dispatcher
        .process_batch(&queue, queue.receive(10).await.unwrap())
        .await;
    assert_eq!(report.published, 1);

    let subjects = notifier.subjects();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].contains("api.example.com"));

    let sent = notifier.sent.lock().unwrap()[0].clone();
    let alert: EnrichedAlert = serde_json::from_str(&sent.message).unwrap();
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.url, "https://api.example.com/v1/health");
    assert_eq!(alert.error_message, "operation timed out");
    assert_eq!(alert.region, "eu-west-1");
    assert!(!alert.runbook_url.is_empty());
    assert!(!alert.dashboard_url.is_empty());
}

#[tokio::test]
async fn test_redelivered_event_publishes_once() {
    let queue = MemoryQueue::new(QueuePolicy {
        visibility_timeout: Duration::ZERO,
        max_receive_count: 5,
    });
    queue.send(&failure_event()).await.unwrap();

    let notifier = RecordingNotifier::new();
    let dispatcher = AlertDispatcher::new(notifier.clone(), AlertMetadata::default());

    // Published, but the acknowledgement never happens
    let first = queue.receive(1).await.unwrap();
    assert_eq!(
        dispatcher.dispatch(&first[0]).await.unwrap(),
        DispatchOutcome::Published
    );

    let redelivery = queue.receive(1).await.unwrap();
    assert_eq!(redelivery[0].receive_count, 2);
    let report = dispatcher.process_batch(&queue, redelivery).await;

    assert_eq!(report.duplicates, 1);
    assert_eq!(notifier.subjects().len(), 1);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_repeated_failures_alert_every_time() {
    let queue = MemoryQueue::default();
    let notifier = RecordingNotifier::new();
    let dispatcher = AlertDispatcher::new(notifier.clone(), AlertMetadata::default());

    // A target that stays down sends the same event shape on every probe
    for _ in 0..5 {
        queue.send(&failure_event()).await.unwrap();
        let report = dispatcher
            .process_batch(&queue, queue.receive(10).await.unwrap())
            .await;
        assert_eq!(report.published, 1);
        assert_eq!(report.duplicates, 0);
    }

    assert_eq!(notifier.subjects().len(), 5);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_rejected_publish_is_redelivered() {
    let hook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&hook)
        .await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&hook)
        .await;

    let queue = MemoryQueue::new(QueuePolicy {
        visibility_timeout: Duration::ZERO,
        max_receive_count: 5,
    });
    queue.send(&failure_event()).await.unwrap();

    let webhook: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(
        reqwest::Client::new(),
        "ops",
        format!("{}/alerts", hook.uri()),
    ));
    let dispatcher = AlertDispatcher::new(
        Arc::new(FanoutNotifier::new(vec![webhook])),
        AlertMetadata::default(),
    );

    let first = dispatcher
        .process_batch(&queue, queue.receive(10).await.unwrap())
        .await;
    assert_eq!(first.failed, 1);
    assert_eq!(queue.len().await, 1);

    let retry = queue.receive(10).await.unwrap();
    assert_eq!(retry[0].receive_count, 2);
    let second = dispatcher.process_batch(&queue, retry).await;
    assert_eq!(second.published, 1);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_poison_message_is_dead_lettered() {
    let queue = Arc::new(MemoryQueue::new(QueuePolicy {
        visibility_timeout: Duration::ZERO,
        max_receive_count: 2,
    }));
    queue.send_raw("{not json".to_string()).await.unwrap();

    let dispatcher = Arc::new(AlertDispatcher::new(
        RecordingNotifier::new(),
        AlertMetadata::default(),
    ));
    let handle = DispatcherHandle::spawn(queue.clone(), dispatcher, 10, Duration::from_secs(3600));

    // Two failed deliveries, then the message is moved aside
    for _ in 0..3 {
        handle.drain_now().await.unwrap();
    }

    assert!(queue.is_empty().await);
    assert_eq!(queue.dead_letters().await.unwrap(), vec!["{not json".to_string()]);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_probe_to_alert_end_to_end() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&target)
        .await;

    let queue = Arc::new(MemoryQueue::default());
    let invocation = ProbeInvocation::new(
        Prober::new().unwrap(),
        MetricsWriter::new(Arc::new(MemoryStore::new())),
        queue.clone(),
    );
    let report = invocation
        .run(&ProbeTarget::new(target.uri(), "local"))
        .await;
    assert!(report.failure_enqueued);

    let notifier = RecordingNotifier::new();
    let dispatcher = AlertDispatcher::new(notifier.clone(), AlertMetadata::default());
    let batch = dispatcher
        .process_batch(queue.as_ref(), queue.receive(10).await.unwrap())
        .await;

    assert_eq!(batch.published, 1);
    let alert: EnrichedAlert =
        serde_json::from_str(&notifier.sent.lock().unwrap()[0].message).unwrap();
    assert_eq!(alert.error_type, "HTTP_STATUS");
    assert_eq!(alert.status_code, Some(503));
    assert_eq!(alert.detected_at, Some(report.record.timestamp));
    assert_eq!(alert.alert_id, format!("127.0.0.1#{}", report.record.timestamp.timestamp_micros()));
}
