//! Upsert-by-key record stores

use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::entity::SqlEntity;
use crate::error::Result;

/// A store that persists typed records with "current values" semantics
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Insert or overwrite one record; returns its stored key
    async fn upsert<R: SqlEntity>(&self, record: &R) -> Result<i64>;
}

/// How often a transient failure of one upsert is retried in place
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ExecutionRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

impl ExecutionRetry {
    /// Fail on the first error
    pub fn none() -> Self {
        Self {
            attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqlRecordStore {
    pool: SqlitePool,
    retry: ExecutionRetry,
}

impl SqlRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_retry(pool, ExecutionRetry::default())
    }

    pub fn with_retry(pool: SqlitePool, retry: ExecutionRetry) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// One upsert inside one transaction
    async fn upsert_once<R: SqlEntity>(&self, record: &R) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let key = record.key();
        let stored = if key == 0 {
            R::insert(&mut *tx, record).await?
        } else {
            match R::find_by_key(&mut *tx, key).await? {
                Some(mut existing) => {
                    existing.apply_from(record);
                    R::update(&mut *tx, &existing).await?;
                    key
                },
                None => R::insert(&mut *tx, record).await?,
            }
        };

        tx.commit().await?;
        Ok(stored)
    }
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn upsert<R: SqlEntity>(&self, record: &R) -> Result<i64> {
        let mut attempt = 0;
        loop {
            match self.upsert_once(record).await {
                Ok(key) => return Ok(key),
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    debug!(
                        "Transient failure writing {} (attempt {}/{}): {}",
                        R::TYPE_TAG,
                        attempt,
                        self.retry.attempts,
                        e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
