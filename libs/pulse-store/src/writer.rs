//! Failover writer
//!
//! Writes go to the primary store. When that fails, a copy of the record is
//! queued for replay and the caller just gets `false`: event processing is
//! never interrupted by store trouble.

use std::sync::Arc;

use errors::GatewayErrorTrait;
use tracing::{debug, error, warn, Level};

use crate::entity::SqlEntity;
use crate::retry_queue::RetryQueue;
use crate::store::RecordStore;

pub struct ReliableWriter<S: RecordStore> {
    store: Arc<S>,
    queue: RetryQueue,
}

impl<S: RecordStore> Clone for ReliableWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<S: RecordStore> ReliableWriter<S> {
    pub fn new(store: Arc<S>, queue: RetryQueue) -> Self {
        Self { store, queue }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    /// Upsert `record`; on failure queue a copy for replay.
    ///
    /// Returns `true` when the primary write succeeded.
    pub async fn write_safe<R: SqlEntity>(&self, record: &R) -> bool {
        // Snapshot before the attempt so the queued copy is what the caller passed
        let copy = record.clone();

        match self.store.upsert(record).await {
            Ok(key) => {
                debug!("Stored {} {}", R::TYPE_TAG, key);
                return true;
            },
            Err(e) if e.log_level() == Level::WARN => {
                warn!("Primary store unavailable, queueing {}: {}", R::TYPE_TAG, e);
            },
            Err(e) => {
                error!("Unexpected failure writing {}, queueing: {}", R::TYPE_TAG, e);
            },
        }

        if let Err(e) = self.queue.enqueue(&copy).await {
            error!("Failed to queue {} for retry: {}", R::TYPE_TAG, e);
        }
        false
    }
}
