//! Per-table reconciliation

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use pulse_model::SyncEntity;
use sqlx::SqlitePool;
use tracing::debug;

use crate::entity::SqlEntity;
use crate::error::Result;

/// Changes applied to the secondary store for one table
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// One table kept aligned from primary to secondary
#[async_trait]
pub trait SyncTable: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make the secondary copy equal to the primary, in one transaction
    async fn sync(&self, primary: &SqlitePool, secondary: &SqlitePool) -> Result<SyncReport>;
}

/// Reconciliation for any keyed, hashable entity
pub struct EntitySync<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> Default for EntitySync<E> {
    fn default() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E: SyncEntity + SqlEntity> EntitySync<E> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<E: SyncEntity + SqlEntity> SyncTable for EntitySync<E> {
    fn name(&self) -> &'static str {
        E::TABLE
    }

    async fn sync(&self, primary: &SqlitePool, secondary: &SqlitePool) -> Result<SyncReport> {
        let source = {
            let mut conn = primary.acquire().await?;
            E::load_all(&mut *conn).await?
        };

        let mut tx = secondary.begin().await?;
        let local = E::load_all(&mut *tx).await?;

        let source_keys: HashMap<i64, &E> = source.iter().map(|e| (e.key(), e)).collect();
        let local_hashes: HashMap<i64, String> =
            local.iter().map(|e| (e.key(), e.content_hash())).collect();

        let mut report = SyncReport::default();

        for item in &source {
            match local_hashes.get(&item.key()) {
                None => {
                    E::insert(&mut *tx, item).await?;
                    report.inserted += 1;
                },
                Some(hash) if *hash != item.content_hash() => {
                    E::update(&mut *tx, item).await?;
                    report.updated += 1;
                },
                Some(_) => {},
            }
        }

        for item in &local {
            if !source_keys.contains_key(&item.key()) {
                E::delete_by_key(&mut *tx, item.key()).await?;
                report.deleted += 1;
            }
        }

        tx.commit().await?;
        debug!(
            "Synced {}: {} inserted, {} updated, {} deleted",
            E::TABLE,
            report.inserted,
            report.updated,
            report.deleted
        );
        Ok(report)
    }
}
