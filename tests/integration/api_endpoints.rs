//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - GET /metrics returns the structured report
//! - Query parameters are validated with structured error bodies
//! - Store failures surface as 500, not as an empty report

use std::net::SocketAddr;
use std::sync::Arc;

use api_monitor::api::{ApiServerConfig, ApiState, spawn_api_server};
use api_monitor::storage::{MemoryStore, MetricsStore};
use chrono::Duration;
use reqwest::StatusCode;
use serde_json::Value;

use crate::helpers::{FailingStore, record};

async fn spawn_test_api(store: Arc<dyn MetricsStore>) -> SocketAddr {
    let config = ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };

    spawn_api_server(config, ApiState::new(store)).await.unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_metrics_report() {
    let store = Arc::new(MemoryStore::new());
    let now = api_monitor::util::now_micros();
    for i in 0..10 {
        let status = if i == 0 { 500 } else { 200 };
        store
            .put_record(record(
                "https://api.example.com",
                now - Duration::minutes(i),
                status,
                25.0,
            ))
            .await
            .unwrap();
    }

    let addr = spawn_test_api(store).await;
    let (status, body) = get(addr, "/metrics?hours=1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["summary"]["uptime"], 90.0);
    assert_eq!(body["data"]["summary"]["averageLatency"], 25.0);
    assert_eq!(body["data"]["timeSeries"].as_array().unwrap().len(), 10);

    // The newest record (i == 0) failed
    let api = &body["data"]["apis"]["api.example.com"];
    assert_eq!(api["currentStatus"], "unhealthy");
    assert_eq!(api["totalChecks"], 10);
    assert_eq!(body["metadata"]["hours"], 1);
}

#[tokio::test]
async fn test_metrics_empty_store() {
    let addr = spawn_test_api(Arc::new(MemoryStore::new())).await;
    let (status, body) = get(addr, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["summary"]["uptime"], 0.0);
    assert_eq!(body["data"]["summary"]["averageLatency"], 0.0);
    assert!(body["data"]["apis"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_filter_by_api() {
    let store = Arc::new(MemoryStore::new());
    let now = api_monitor::util::now_micros();
    store
        .put_record(record("https://a.example.com", now, 200, 1.0))
        .await
        .unwrap();
    store
        .put_record(record("https://b.example.com", now, 503, 1.0))
        .await
        .unwrap();

    let addr = spawn_test_api(store).await;
    let (status, body) = get(addr, "/metrics?api=b.example.com").await;

    assert_eq!(status, StatusCode::OK);
    let apis = body["data"]["apis"].as_object().unwrap();
    assert_eq!(apis.len(), 1);
    assert!(apis.contains_key("b.example.com"));
    assert_eq!(body["metadata"]["api"], "b.example.com");
}

#[tokio::test]
async fn test_invalid_hours() {
    let addr = spawn_test_api(Arc::new(MemoryStore::new())).await;

    for path in ["/metrics?hours=abc", "/metrics?hours=0", "/metrics?hours=100000"] {
        let (status, body) = get(addr, path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INVALID_REQUEST");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_store_failure_is_500() {
    let addr = spawn_test_api(Arc::new(FailingStore)).await;
    let (status, body) = get(addr, "/metrics?hours=2").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "QUERY_FAILED");
    assert!(body["message"].as_str().unwrap().contains("store offline"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_test_api(Arc::new(MemoryStore::new())).await;
    let (status, body) = get(addr, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);

    let addr = spawn_test_api(Arc::new(FailingStore)).await;
    let (status, body) = get(addr, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["storage"]["healthy"], false);
}
