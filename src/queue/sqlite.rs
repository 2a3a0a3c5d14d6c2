//! SQLite-backed failure queue
//!
//! Shares the pool (and therefore the database file) with `SqliteStore`.
//! Visibility is tracked as a unix-millisecond `visible_at` column; a
//! delivery bumps `receive_count` and pushes `visible_at` forward in the
//! same transaction that selects it.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, instrument, warn};

use super::{Delivery, FailureQueue, QueuePolicy, parse_receipt, receipt_for};
use crate::error::QueueError;

pub struct SqliteQueue {
    pool: Pool<Sqlite>,
    policy: QueuePolicy,
}

impl SqliteQueue {
    /// Wrap an already-migrated pool (see `storage::sqlite::connect`)
    pub fn new(pool: Pool<Sqlite>, policy: QueuePolicy) -> Self {
        Self { pool, policy }
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl FailureQueue for SqliteQueue {
    #[instrument(skip_all)]
    async fn send_raw(&self, body: String) -> Result<(), QueueError> {
        let now = Self::now_millis();
        let result = sqlx::query(
            "INSERT INTO failure_queue (body, enqueued_at, visible_at) VALUES (?, ?, ?)",
        )
        .bind(&body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("enqueued failure message {}", result.last_insert_rowid());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;

        let dead = sqlx::query(
            "UPDATE failure_queue SET dead = 1 \
             WHERE dead = 0 AND visible_at <= ? AND receive_count >= ?",
        )
        .bind(now)
        .bind(i64::from(self.policy.max_receive_count))
        .execute(&mut *tx)
        .await?;
        if dead.rows_affected() > 0 {
            warn!("dead-lettered {} failure messages", dead.rows_affected());
        }

        let rows = sqlx::query(
            "SELECT id, body, receive_count FROM failure_queue \
             WHERE dead = 0 AND visible_at <= ? ORDER BY id ASC LIMIT ?",
        )
        .bind(now)
        .bind(max as i64)
        .fetch_all(&mut *tx)
        .await?;

        let hidden_until = now + self.policy.visibility_timeout.as_millis() as i64;
        let mut deliveries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let body: String = row.try_get("body")?;
            let receive_count = row.try_get::<i64, _>("receive_count")? as u32 + 1;

            sqlx::query("UPDATE failure_queue SET receive_count = ?, visible_at = ? WHERE id = ?")
                .bind(i64::from(receive_count))
                .bind(hidden_until)
                .bind(id)
                .execute(&mut *tx)
                .await?;

            deliveries.push(Delivery {
                receipt: receipt_for(id as u64, receive_count),
                body,
                receive_count,
            });
        }

        tx.commit().await?;
        Ok(deliveries)
    }

    #[instrument(skip(self))]
    async fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        let (id, receive_count) = parse_receipt(receipt)?;

        let result =
            sqlx::query("DELETE FROM failure_queue WHERE id = ? AND receive_count = ? AND dead = 0")
                .bind(id as i64)
                .bind(i64::from(receive_count))
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::StaleReceipt(receipt.to_string()));
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<String>, QueueError> {
        let rows = sqlx::query("SELECT body FROM failure_queue WHERE dead = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("body").map_err(QueueError::from))
            .collect()
    }
}
