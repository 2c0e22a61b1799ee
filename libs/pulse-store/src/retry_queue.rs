//! Durable, content-addressed retry queue
//!
//! Lives in the local fallback store so failed primary writes survive a
//! restart. Enqueue is idempotent per payload hash.

use pulse_model::{Record, RetryQueueItem};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::debug;

use crate::error::Result;

/// DDL for queued writes
pub const RETRY_QUEUE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS retry_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payload_type TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        payload_hash TEXT NOT NULL,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        created_on_utc TEXT NOT NULL,
        last_error TEXT
    )
"#;

pub const RETRY_QUEUE_HASH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_retry_queue_hash ON retry_queue(payload_hash)";

#[derive(Clone)]
pub struct RetryQueue {
    pool: SqlitePool,
}

impl RetryQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue a record for replay. Returns `false` when an identical payload
    /// is already queued.
    pub async fn enqueue<R: Record>(&self, record: &R) -> Result<bool> {
        let item = RetryQueueItem::wrap(record)?;
        self.enqueue_item(&item).await
    }

    pub async fn enqueue_item(&self, item: &RetryQueueItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO retry_queue
                (payload_type, payload_json, payload_hash, attempt_count, created_on_utc, last_error)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM retry_queue WHERE payload_hash = ?)
            "#,
        )
        .bind(&item.payload_type)
        .bind(&item.payload_json)
        .bind(&item.payload_hash)
        .bind(item.attempt_count)
        .bind(item.created_on_utc)
        .bind(&item.last_error)
        .bind(&item.payload_hash)
        .execute(&self.pool)
        .await?;

        let queued = result.rows_affected() > 0;
        if queued {
            debug!("Queued {} for retry", item.payload_type);
        } else {
            debug!("{} already queued, skipping", item.payload_type);
        }
        Ok(queued)
    }

    /// Every queued item, oldest first
    pub async fn load_all(&self) -> Result<Vec<RetryQueueItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload_type, payload_json, payload_hash, attempt_count,
                   created_on_utc, last_error
            FROM retry_queue ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(hydrate_item(&row)?);
        }
        Ok(items)
    }

    pub async fn get(&self, id: i64) -> Result<Option<RetryQueueItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, payload_type, payload_json, payload_hash, attempt_count,
                   created_on_utc, last_error
            FROM retry_queue WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(hydrate_item).transpose()?)
    }

    /// Bump the attempt counter; returns the new count (`None` if the item is gone)
    pub async fn record_failure(&self, id: i64, error: &str) -> Result<Option<i64>> {
        let last_error = (!error.trim().is_empty()).then_some(error);
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE retry_queue
            SET attempt_count = attempt_count + 1,
                last_error = COALESCE(?, last_error)
            WHERE id = ?
            RETURNING attempt_count
            "#,
        )
        .bind(last_error)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM retry_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM retry_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

fn hydrate_item(row: &SqliteRow) -> std::result::Result<RetryQueueItem, sqlx::Error> {
    Ok(RetryQueueItem {
        id: row.try_get("id")?,
        payload_type: row.try_get("payload_type")?,
        payload_json: row.try_get("payload_json")?,
        payload_hash: row.try_get("payload_hash")?,
        attempt_count: row.try_get("attempt_count")?,
        created_on_utc: row.try_get("created_on_utc")?,
        last_error: row.try_get("last_error")?,
    })
}
