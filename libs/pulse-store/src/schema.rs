//! Table bootstrap for the primary and fallback stores

use pulse_rules::PATTERN_MAPPINGS_TABLE;
use sqlx::SqlitePool;
use tracing::debug;

use crate::audit::LOG_ENTRIES_TABLE;
use crate::entity::MACHINE_EVENTS_TABLE;
use crate::error::Result;
use crate::retry_queue::{RETRY_QUEUE_HASH_INDEX, RETRY_QUEUE_TABLE};

/// Tables on the primary store: events, rules, audit log
pub async fn ensure_primary_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in [MACHINE_EVENTS_TABLE, PATTERN_MAPPINGS_TABLE, LOG_ENTRIES_TABLE] {
        sqlx::query(ddl).execute(pool).await?;
    }
    debug!("Primary schema ready");
    Ok(())
}

/// Tables on the local fallback store: rule copy and retry queue
pub async fn ensure_fallback_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in [PATTERN_MAPPINGS_TABLE, RETRY_QUEUE_TABLE, RETRY_QUEUE_HASH_INDEX] {
        sqlx::query(ddl).execute(pool).await?;
    }
    debug!("Fallback schema ready");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schemas_are_idempotent() {
        let primary = memory_pool().await;
        ensure_primary_schema(&primary).await.unwrap();
        ensure_primary_schema(&primary).await.unwrap();
        let names = table_names(&primary).await;
        for table in ["log_entries", "machine_events", "pattern_mappings"] {
            assert!(names.iter().any(|n| n == table), "missing {}", table);
        }

        let fallback = memory_pool().await;
        ensure_fallback_schema(&fallback).await.unwrap();
        ensure_fallback_schema(&fallback).await.unwrap();
        let names = table_names(&fallback).await;
        assert!(names.iter().any(|n| n == "retry_queue"));
        assert!(!names.iter().any(|n| n == "machine_events"));
    }
}
