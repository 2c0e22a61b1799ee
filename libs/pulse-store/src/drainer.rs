//! Retry drainer - replays queued writes on a fixed interval
//!
//! Each cycle walks the queue oldest first:
//! - replay succeeds: item deleted, informational audit entry
//! - replay fails: attempt counter bumped, last error kept
//! - counter at the ceiling: item dead-lettered (warning + audit entry, deleted)
//!
//! A queue error on one item is logged and the cycle moves on to the next.

use std::sync::Arc;
use std::time::Duration;

use pulse_model::{MachineEvent, PatternMapping, RetryQueueItem};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use errors::GatewayErrorTrait;
use tracing::{debug, error, info, warn, Level};

use crate::audit::AuditLog;
use crate::entity::SqlEntity;
use crate::error::{Result, StoreError};
use crate::retry_queue::RetryQueue;
use crate::store::RecordStore;

/// Default drain interval (30 s)
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;

/// Default attempt ceiling before an item is dead-lettered
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5000;

/// Payload types the drainer knows how to replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayKind {
    MachineEvent,
    PatternMapping,
}

impl ReplayKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        use pulse_model::Record;
        match tag {
            t if t == MachineEvent::TYPE_TAG => Some(ReplayKind::MachineEvent),
            t if t == PatternMapping::TYPE_TAG => Some(ReplayKind::PatternMapping),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DrainerConfig {
    pub interval: Duration,
    pub max_attempts: i64,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Outcome of one drain cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Items whose queue bookkeeping failed; they stay queued as they were
    pub queue_errors: usize,
}

pub struct RetryDrainer<S: RecordStore> {
    store: Arc<S>,
    queue: RetryQueue,
    audit: AuditLog,
    config: DrainerConfig,
}

impl<S: RecordStore> RetryDrainer<S> {
    pub fn new(store: Arc<S>, queue: RetryQueue, audit: AuditLog, config: DrainerConfig) -> Self {
        Self {
            store,
            queue,
            audit,
            config,
        }
    }

    /// Drain on every interval tick until cancelled
    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Retry drainer started ({:?} interval, {} attempt ceiling)",
            self.config.interval, self.config.max_attempts
        );
        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once().await {
                        Ok(report) if report != DrainReport::default() => {
                            info!(
                                "Retry cycle: {} replayed, {} failed, {} dead-lettered, {} queue errors",
                                report.replayed,
                                report.failed,
                                report.dead_lettered,
                                report.queue_errors
                            );
                        },
                        Ok(_) => {},
                        Err(e) => error!("Unhandled error in retry loop: {}", e),
                    }
                }
                _ = token.cancelled() => {
                    info!("Retry drainer received shutdown signal");
                    break;
                }
            }
        }
    }

    /// One pass over the whole queue
    ///
    /// Only failing to load the queue aborts the pass.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let items = self.queue.load_all().await?;
        let mut report = DrainReport::default();

        for item in items {
            if item.attempt_count >= self.config.max_attempts {
                self.dead_letter_counted(&item, item.attempt_count, &mut report)
                    .await;
                continue;
            }

            match self.replay(&item).await {
                Ok(key) => {
                    if let Err(e) = self.queue.delete(item.id).await {
                        error!("Failed to remove retried item {}: {}", item.id, e);
                        report.queue_errors += 1;
                        continue;
                    }
                    self.audit
                        .info(format!(
                            "Retried {} successfully (Item {}, stored as {}).",
                            item.payload_type, item.id, key
                        ))
                        .await;
                    report.replayed += 1;
                },
                Err(e) => {
                    if e.log_level() == Level::WARN {
                        debug!("Retry of item {} failed: {}", item.id, e);
                    } else {
                        warn!("Retry attempt failed for item {}: {}", item.id, e);
                    }
                    report.failed += 1;

                    match self.queue.record_failure(item.id, &e.to_string()).await {
                        Ok(Some(attempts)) if attempts >= self.config.max_attempts => {
                            self.dead_letter_counted(&item, attempts, &mut report).await;
                        },
                        Ok(_) => {},
                        Err(qe) => {
                            error!("Failed to record attempt for item {}: {}", item.id, qe);
                            report.queue_errors += 1;
                        },
                    }
                },
            }
        }

        Ok(report)
    }

    async fn dead_letter_counted(
        &self,
        item: &RetryQueueItem,
        attempts: i64,
        report: &mut DrainReport,
    ) {
        match self.dead_letter(item, attempts).await {
            Ok(()) => report.dead_lettered += 1,
            Err(e) => {
                error!("Failed to drop retry item {}: {}", item.id, e);
                report.queue_errors += 1;
            },
        }
    }

    async fn replay(&self, item: &RetryQueueItem) -> Result<i64> {
        match ReplayKind::from_tag(&item.payload_type) {
            Some(ReplayKind::MachineEvent) => self.replay_as::<MachineEvent>(item).await,
            Some(ReplayKind::PatternMapping) => self.replay_as::<PatternMapping>(item).await,
            None => Err(StoreError::UnknownPayloadType(item.payload_type.clone())),
        }
    }

    async fn replay_as<R: SqlEntity>(&self, item: &RetryQueueItem) -> Result<i64> {
        let record: R = item.unwrap_payload()?;
        self.store.upsert(&record).await
    }

    async fn dead_letter(&self, item: &RetryQueueItem, attempts: i64) -> Result<()> {
        self.queue.delete(item.id).await?;
        warn!(
            "Dropping retry item {} ({}) after {} attempts",
            item.id, item.payload_type, attempts
        );
        self.audit
            .warning(format!(
                "Dropping retry item {} after {} attempts.",
                item.id, attempts
            ))
            .await;
        Ok(())
    }
}
