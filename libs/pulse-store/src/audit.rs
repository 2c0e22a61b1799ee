//! Operator-visible audit log on the primary store

use pulse_model::{AuditLevel, LogEntry};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::{Result, StoreError};

/// DDL for audit entries
pub const LOG_ENTRIES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS log_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp_utc TEXT NOT NULL,
        message TEXT NOT NULL,
        level TEXT NOT NULL
    )
"#;

/// Writes audit entries; failures are logged and swallowed
#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn write(&self, level: AuditLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        if let Err(e) = self.insert(&entry).await {
            warn!("Failed to write audit entry '{}': {}", entry.message, e);
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.write(AuditLevel::Information, message).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.write(AuditLevel::Warning, message).await;
    }

    async fn insert(&self, entry: &LogEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO log_entries (timestamp_utc, message, level) VALUES (?, ?, ?)",
        )
        .bind(entry.timestamp_utc)
        .bind(&entry.message)
        .bind(entry.level.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp_utc, message, level
            FROM log_entries ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let level: String = row.try_get("level")?;
            entries.push(LogEntry {
                id: row.try_get("id")?,
                timestamp_utc: row.try_get("timestamp_utc")?,
                message: row.try_get("message")?,
                level: level.parse().map_err(StoreError::Invalid)?,
            });
        }
        Ok(entries)
    }
}
