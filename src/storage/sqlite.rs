//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (the read API) don't block the probers' writes
//! - **Connection pooling**: One pool shared with the SQLite failure queue
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Layout
//!
//! `probe_records` has the primary key `(partition_key, timestamp)`, so the
//! per-partition range queries used by the aggregator are index range scans.
//! Timestamps are stored as unix microseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, MetricsStore, PageCursor, RangeQuery, RecordPage};
use super::error::{PersistenceError, StorageResult};
use crate::schema::{ProbeRecord, SslInfo};

/// Open (or create) a SQLite database and run migrations
///
/// The returned pool can be shared between `SqliteStore` and
/// `SqliteQueue`.
#[instrument(skip_all)]
pub async fn connect(db_path: impl AsRef<Path>) -> StorageResult<Pool<Sqlite>> {
    let db_path_str = db_path.as_ref().to_string_lossy().to_string();

    info!("opening SQLite database at: {}", db_path_str);

    let options = SqliteConnectOptions::new()
        .filename(&db_path_str)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| PersistenceError::ConnectionFailed(e.to_string()))?;

    debug!("running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database migrations complete");

    Ok(pool)
}

/// SQLite storage backend
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open the database at `db_path` and wrap it in a store
    ///
    /// ```no_run
    /// # use api_monitor::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./metrics.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();
        let pool = connect(&db_path).await?;
        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Pool handle for sharing the database with other components
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    fn micros_to_timestamp(micros: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            PersistenceError::SerializationError(format!("timestamp {micros} out of range"))
        })
    }

    fn row_to_record(row: &SqliteRow) -> StorageResult<ProbeRecord> {
        let status_code: i64 = row.try_get("status_code")?;
        let status_code = u16::try_from(status_code).map_err(|_| {
            PersistenceError::SerializationError(format!("invalid status code {status_code}"))
        })?;

        Ok(ProbeRecord {
            partition_key: row.try_get("partition_key")?,
            timestamp: Self::micros_to_timestamp(row.try_get("timestamp")?)?,
            url: row.try_get("url")?,
            region: row.try_get("region")?,
            status_code,
            latency_ms: row.try_get("latency_ms")?,
            success: row.try_get("success")?,
            response_size: row
                .try_get::<Option<i64>, _>("response_size")?
                .map(|v| v as u64),
            ssl_info: row
                .try_get::<Option<bool>, _>("ssl_authorized")?
                .map(|authorized| SslInfo { authorized }),
            error_type: row.try_get("error_type")?,
            error_message: row.try_get("error_message")?,
        })
    }
}

const RECORD_COLUMNS: &str = "partition_key, timestamp, url, region, status_code, latency_ms, \
     success, response_size, ssl_authorized, error_type, error_message";

#[async_trait]
impl MetricsStore for SqliteStore {
    #[instrument(skip(self, record), fields(partition = %record.partition_key))]
    async fn put_record(&self, record: ProbeRecord) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO probe_records ({RECORD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );

        let result = sqlx::query(&sql)
            .bind(&record.partition_key)
            .bind(record.timestamp.timestamp_micros())
            .bind(&record.url)
            .bind(&record.region)
            .bind(i64::from(record.status_code))
            .bind(record.latency_ms)
            .bind(record.success)
            .bind(record.response_size.map(|v| v as i64))
            .bind(record.ssl_info.as_ref().map(|s| s.authorized))
            .bind(&record.error_type)
            .bind(&record.error_message)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!("stored record at {}", record.timestamp);
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(PersistenceError::Conflict {
                    partition_key: record.partition_key,
                    timestamp: record.timestamp.to_rfc3339(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn get_record(
        &self,
        partition_key: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<Option<ProbeRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM probe_records WHERE partition_key = ? AND timestamp = ?"
        );

        let row = sqlx::query(&sql)
            .bind(partition_key)
            .bind(timestamp.timestamp_micros())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    #[instrument(skip(self))]
    async fn list_partitions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT partition_key
            FROM probe_records
            WHERE timestamp >= ? AND timestamp <= ?
            ORDER BY partition_key
            "#,
        )
        .bind(start.timestamp_micros())
        .bind(end.timestamp_micros())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    #[instrument(skip(self), fields(partition = %query.partition_key))]
    async fn query_page(
        &self,
        query: &RangeQuery,
        cursor: Option<PageCursor>,
    ) -> StorageResult<RecordPage> {
        let (lower_op, lower) = match cursor {
            Some(PageCursor(after)) => (">", after.timestamp_micros()),
            None => (">=", query.start.timestamp_micros()),
        };

        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM probe_records
            WHERE partition_key = ? AND timestamp {lower_op} ? AND timestamp <= ?
            ORDER BY timestamp ASC
            LIMIT ?
            "#
        );

        // One extra row tells us whether another page follows
        let rows = sqlx::query(&sql)
            .bind(&query.partition_key)
            .bind(lower)
            .bind(query.end.timestamp_micros())
            .bind((query.page_size + 1) as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<StorageResult<Vec<_>>>()?;

        let next = if records.len() > query.page_size {
            records.truncate(query.page_size);
            records.last().map(|r| PageCursor(r.timestamp))
        } else {
            None
        };

        debug!("page returned {} records", records.len());
        Ok(RecordPage { records, next })
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM probe_records WHERE timestamp < ?")
            .bind(before.timestamp_micros())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old probe records", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
