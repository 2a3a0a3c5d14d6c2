//! Metrics aggregator: summary statistics over a lookback window
//!
//! ## Query plan
//!
//! 1. Resolve the partitions to read: the requested one, or every partition
//!    with records in the window (`MetricsStore::list_partitions`)
//! 2. Read each partition with a paginated key-range query, partitions in
//!    parallel
//! 3. Sort everything by timestamp and group by partition
//!
//! Store order is never relied upon. Zero records is a valid, all-zero
//! report; a failing store is a `QueryError`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{QueryError, SchemaError};
use crate::schema::{ProbeRecord, partition_key_for};
use crate::storage::backend::DEFAULT_PAGE_SIZE;
use crate::storage::{MetricsStore, RangeQuery};
use crate::util::round2;

pub const DEFAULT_LOOKBACK_HOURS: u32 = 1;

/// Longest accepted lookback (30 days)
pub const MAX_LOOKBACK_HOURS: u32 = 720;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub hours: u32,
    /// Restrict the report to one target (host name)
    pub api: Option<String>,
}

impl Default for AggregateQuery {
    fn default() -> Self {
        Self {
            hours: DEFAULT_LOOKBACK_HOURS,
            api: None,
        }
    }
}

impl AggregateQuery {
    pub fn new(hours: u32, api: Option<String>) -> Self {
        Self { hours, api }
    }

    fn validate(&self) -> Result<(), QueryError> {
        if self.hours == 0 || self.hours > MAX_LOOKBACK_HOURS {
            return Err(QueryError::InvalidWindow {
                hours: self.hours,
                max: MAX_LOOKBACK_HOURS,
            });
        }
        Ok(())
    }

    /// Partition key for the `api` filter
    ///
    /// Accepts a bare host name or a full URL.
    fn partition_filter(&self) -> Result<Option<String>, QueryError> {
        let Some(api) = self.api.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if api.is_empty() {
            return Err(QueryError::InvalidFilter(SchemaError::MissingField("api")));
        }
        if api.contains("://") {
            return partition_key_for(api)
                .map(Some)
                .map_err(QueryError::InvalidFilter);
        }
        Ok(Some(api.to_lowercase()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total_checks: usize,
    pub successful_checks: usize,
    /// Percentage of successful checks, 0 when there are none
    pub uptime: f64,
    /// Mean latency of successful checks in ms, 0 when there are none
    pub average_latency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetHealth {
    Healthy,
    Unhealthy,
}

impl From<bool> for TargetHealth {
    fn from(success: bool) -> Self {
        if success {
            TargetHealth::Healthy
        } else {
            TargetHealth::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub url: String,
    pub total_checks: usize,
    pub uptime: f64,
    pub average_latency: f64,
    /// Outcome of the chronologically last check
    pub current_status: TargetHealth,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub api: String,
    pub region: String,
    pub status_code: u16,
    pub latency_ms: f64,
    pub success: bool,
}

impl From<&ProbeRecord> for TimeSeriesPoint {
    fn from(record: &ProbeRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            api: record.partition_key.clone(),
            region: record.region.clone(),
            status_code: record.status_code,
            latency_ms: record.latency_ms,
            success: record.success,
        }
    }
}

/// Window a report was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub summary: AggregateSummary,
    pub time_series: Vec<TimeSeriesPoint>,
    pub apis: BTreeMap<String, TargetSummary>,
}

/// Overall statistics for a set of records
pub fn summarize(records: &[ProbeRecord]) -> AggregateSummary {
    let total_checks = records.len();
    let successful: Vec<f64> = records
        .iter()
        .filter(|r| r.success)
        .map(|r| r.latency_ms)
        .collect();
    let successful_checks = successful.len();

    let uptime = if total_checks == 0 {
        0.0
    } else {
        round2(successful_checks as f64 / total_checks as f64 * 100.0)
    };
    let average_latency = if successful_checks == 0 {
        0.0
    } else {
        round2(successful.iter().sum::<f64>() / successful_checks as f64)
    };

    AggregateSummary {
        total_checks,
        successful_checks,
        uptime,
        average_latency,
    }
}

/// Sort records chronologically and compute the report
pub fn build_report(mut records: Vec<ProbeRecord>) -> MetricsReport {
    records.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.partition_key.cmp(&b.partition_key))
    });

    let mut groups: BTreeMap<String, Vec<ProbeRecord>> = BTreeMap::new();
    for record in &records {
        groups
            .entry(record.partition_key.clone())
            .or_default()
            .push(record.clone());
    }

    let apis = groups
        .into_iter()
        .filter_map(|(key, group)| {
            let last = group.last()?;
            let stats = summarize(&group);
            let target = TargetSummary {
                url: last.url.clone(),
                total_checks: stats.total_checks,
                uptime: stats.uptime,
                average_latency: stats.average_latency,
                current_status: last.success.into(),
                last_checked: last.timestamp,
            };
            Some((key, target))
        })
        .collect();

    MetricsReport {
        summary: summarize(&records),
        time_series: records.iter().map(TimeSeriesPoint::from).collect(),
        apis,
    }
}

/// Answers read requests from the store
#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn MetricsStore>,
    page_size: usize,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Report over `[now - hours, now]`
    pub async fn aggregate(
        &self,
        query: &AggregateQuery,
    ) -> Result<(MetricsReport, ReportWindow), QueryError> {
        self.aggregate_at(query, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn aggregate_at(
        &self,
        query: &AggregateQuery,
        now: DateTime<Utc>,
    ) -> Result<(MetricsReport, ReportWindow), QueryError> {
        query.validate()?;
        let window = ReportWindow {
            start: now - Duration::hours(i64::from(query.hours)),
            end: now,
        };

        let partitions = match query.partition_filter()? {
            Some(partition) => vec![partition],
            None => self.store.list_partitions(window.start, window.end).await?,
        };
        debug!("aggregating {} partitions", partitions.len());

        let pages = try_join_all(
            partitions
                .iter()
                .map(|partition| self.read_partition(partition, window)),
        )
        .await?;

        let records: Vec<ProbeRecord> = pages.into_iter().flatten().collect();
        debug!("aggregating {} records", records.len());
        Ok((build_report(records), window))
    }

    async fn read_partition(
        &self,
        partition: &str,
        window: ReportWindow,
    ) -> Result<Vec<ProbeRecord>, QueryError> {
        let range = RangeQuery::new(partition, window.start, window.end).with_page_size(self.page_size);

        let mut records = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.store.query_page(&range, cursor).await?;
            records.extend(page.records);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ProbeResponse, ProbeTarget};
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn record(url: &str, at: DateTime<Utc>, status: u16, latency_ms: f64) -> ProbeRecord {
        let target = ProbeTarget::new(url, "local");
        ProbeRecord::from_outcome(
            target.partition_key().unwrap(),
            &target,
            at,
            latency_ms,
            &Ok(ProbeResponse {
                status_code: status,
                response_size: 0,
                ssl_info: None,
            }),
        )
    }

    fn now() -> DateTime<Utc> {
        crate::util::truncate_micros(Utc::now())
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.uptime, 0.0);
        assert_eq!(summary.average_latency, 0.0);
        assert_eq!(summary.total_checks, 0);
    }

    #[test]
    fn test_average_latency_ignores_failures() {
        let t = now();
        let records = vec![
            record("https://a.example.com", t, 200, 10.0),
            record("https://a.example.com", t + Duration::seconds(1), 200, 20.0),
            record("https://a.example.com", t + Duration::seconds(2), 500, 1000.0),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.average_latency, 15.0);
        assert_eq!(summary.uptime, 66.67);
    }

    #[test]
    fn test_current_status_uses_latest_record() {
        let t = now();
        // Deliberately out of order
        let records = vec![
            record("https://a.example.com", t + Duration::seconds(5), 500, 1.0),
            record("https://a.example.com", t + Duration::seconds(10), 200, 1.0),
            record("https://a.example.com", t, 500, 1.0),
        ];
        let report = build_report(records);
        let target = &report.apis["a.example.com"];
        assert_eq!(target.current_status, TargetHealth::Healthy);
        assert_eq!(target.last_checked, t + Duration::seconds(10));
        assert!(report.time_series.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_nine_of_ten_is_ninety_percent() {
        let store = Arc::new(MemoryStore::new());
        let t = now();
        for i in 0..10 {
            let status = if i == 3 { 503 } else { 200 };
            store
                .put_record(record(
                    "https://api.example.com",
                    t - Duration::minutes(i),
                    status,
                    40.0,
                ))
                .await
                .unwrap();
        }

        let aggregator = MetricsAggregator::new(store).with_page_size(3);
        let (report, window) = aggregator
            .aggregate_at(&AggregateQuery::default(), t)
            .await
            .unwrap();

        assert_eq!(report.summary.uptime, 90.0);
        assert_eq!(report.summary.total_checks, 10);
        assert_eq!(report.time_series.len(), 10);
        assert_eq!(window.end - window.start, Duration::hours(1));
    }

    #[tokio::test]
    async fn test_window_and_filter() {
        let store = Arc::new(MemoryStore::new());
        let t = now();
        store
            .put_record(record("https://a.example.com", t - Duration::minutes(5), 200, 1.0))
            .await
            .unwrap();
        store
            .put_record(record("https://b.example.com", t - Duration::minutes(5), 200, 1.0))
            .await
            .unwrap();
        // Outside the default window
        store
            .put_record(record("https://a.example.com", t - Duration::hours(2), 500, 1.0))
            .await
            .unwrap();

        let aggregator = MetricsAggregator::new(store);

        let (all, _) = aggregator
            .aggregate_at(&AggregateQuery::default(), t)
            .await
            .unwrap();
        assert_eq!(all.apis.keys().collect::<Vec<_>>(), vec!["a.example.com", "b.example.com"]);
        assert_eq!(all.summary.uptime, 100.0);

        let (only_a, _) = aggregator
            .aggregate_at(&AggregateQuery::new(3, Some("A.example.com".to_string())), t)
            .await
            .unwrap();
        assert_eq!(only_a.summary.total_checks, 2);
        assert_eq!(only_a.summary.uptime, 50.0);
        assert_eq!(only_a.apis.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_window_rejected() {
        let aggregator = MetricsAggregator::new(Arc::new(MemoryStore::new()));
        assert_matches!(
            aggregator.aggregate(&AggregateQuery::new(0, None)).await,
            Err(QueryError::InvalidWindow { hours: 0, .. })
        );
        assert_matches!(
            aggregator
                .aggregate(&AggregateQuery::new(MAX_LOOKBACK_HOURS + 1, None))
                .await,
            Err(QueryError::InvalidWindow { .. })
        );
        assert_matches!(
            aggregator
                .aggregate(&AggregateQuery::new(1, Some("  ".to_string())))
                .await,
            Err(QueryError::InvalidFilter(_))
        );
    }
}
