//! Read API response bodies

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::{MetricsReport, ReportWindow};

/// Response for GET /metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub success: bool,
    pub data: MetricsReport,
    pub metadata: MetricsMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsMetadata {
    pub hours: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

impl MetricsResponse {
    pub fn new(report: MetricsReport, window: ReportWindow, hours: u32, api: Option<String>) -> Self {
        Self {
            success: true,
            data: report,
            metadata: MetricsMetadata {
                hours,
                api,
                window_start: window.start,
                window_end: window.end,
                generated_at: Utc::now(),
            },
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Response for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}
