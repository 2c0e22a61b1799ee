//! Integration tests for the failover writer and the retry drainer
//!
//! The primary store is an in-memory SQLite database behind a switch that
//! makes it fail the way an unreachable server does.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_model::{AuditLevel, InputVector, MachineEvent, RetryQueueItem};
use pulse_store::{
    schema, AuditLog, DrainReport, DrainerConfig, RecordStore, ReliableWriter, RetryDrainer,
    RetryQueue, SqlEntity, SqlRecordStore, StoreError,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

/// Primary store that can be taken offline
struct SwitchableStore {
    inner: SqlRecordStore,
    offline: AtomicBool,
}

impl SwitchableStore {
    fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqlRecordStore::new(pool),
            offline: AtomicBool::new(false),
        }
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for SwitchableStore {
    async fn upsert<R: SqlEntity>(&self, record: &R) -> pulse_store::Result<i64> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.upsert(record).await
    }
}

/// Accepts every record but closes the retry queue's database on the way
struct QueueClosingStore {
    fallback: SqlitePool,
    upserts: AtomicUsize,
}

#[async_trait]
impl RecordStore for QueueClosingStore {
    async fn upsert<R: SqlEntity>(&self, _record: &R) -> pulse_store::Result<i64> {
        self.fallback.close().await;
        Ok(self.upserts.fetch_add(1, Ordering::SeqCst) as i64 + 1)
    }
}

struct Harness {
    primary: SqlitePool,
    store: Arc<SwitchableStore>,
    queue: RetryQueue,
    audit: AuditLog,
}

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database")
}

async fn harness() -> Harness {
    let primary = memory_pool().await;
    schema::ensure_primary_schema(&primary).await.unwrap();
    let fallback = memory_pool().await;
    schema::ensure_fallback_schema(&fallback).await.unwrap();

    Harness {
        store: Arc::new(SwitchableStore::new(primary.clone())),
        queue: RetryQueue::new(fallback),
        audit: AuditLog::new(primary.clone()),
        primary,
    }
}

impl Harness {
    fn writer(&self) -> ReliableWriter<SwitchableStore> {
        ReliableWriter::new(self.store.clone(), self.queue.clone())
    }

    fn drainer(&self, max_attempts: i64) -> RetryDrainer<SwitchableStore> {
        RetryDrainer::new(
            self.store.clone(),
            self.queue.clone(),
            self.audit.clone(),
            DrainerConfig {
                interval: Duration::from_millis(20),
                max_attempts,
            },
        )
    }

    async fn stored_events(&self) -> Vec<MachineEvent> {
        let mut conn = self.primary.acquire().await.unwrap();
        MachineEvent::load_all(&mut *conn).await.unwrap()
    }
}

fn event() -> MachineEvent {
    let mut lines = vec![false; 16];
    lines[0] = true;
    lines[5] = true;
    MachineEvent::from_inputs(3, &InputVector::new(lines), Some(8))
}

#[tokio::test]
async fn test_write_safe_succeeds_when_primary_up() {
    let h = harness().await;
    assert!(h.writer().write_safe(&event()).await);
    assert_eq!(h.stored_events().await.len(), 1);
    assert!(h.queue.is_empty().await.unwrap());
}

#[tokio::test]
#[traced_test]
async fn test_outage_queues_then_drain_replays() {
    let h = harness().await;
    let e = event();

    h.store.set_offline(true);
    assert!(!h.writer().write_safe(&e).await);
    assert!(logs_contain("Primary store unavailable"));

    let items = h.queue.load_all().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempt_count, 0);
    assert_eq!(items[0].payload_type, "MachineEvent");
    assert!(h.stored_events().await.is_empty());

    h.store.set_offline(false);
    let report = h.drainer(5000).drain_once().await.unwrap();
    assert_eq!(
        report,
        DrainReport {
            replayed: 1,
            failed: 0,
            dead_lettered: 0,
            queue_errors: 0,
        }
    );

    // Deleted, not updated
    assert!(h.queue.get(items[0].id).await.unwrap().is_none());
    let stored = h.stored_events().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].machine_id, e.machine_id);
    assert_eq!(stored[0].status_id, Some(8));
    assert!(stored[0].in_cycle);

    let audit = h.audit.recent(10).await.unwrap();
    assert_eq!(audit[0].level, AuditLevel::Information);
    assert!(audit[0].message.contains("Retried MachineEvent successfully"));
}

#[tokio::test]
async fn test_repeated_failure_of_same_record_queues_once() {
    let h = harness().await;
    let e = event();
    h.store.set_offline(true);

    let writer = h.writer();
    assert!(!writer.write_safe(&e).await);
    assert!(!writer.write_safe(&e).await);
    assert_eq!(h.queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_replay_counts_attempts() {
    let h = harness().await;
    h.store.set_offline(true);
    h.writer().write_safe(&event()).await;

    let drainer = h.drainer(5000);
    for _ in 0..3 {
        let report = drainer.drain_once().await.unwrap();
        assert_eq!(report.failed, 1);
    }

    let item = h.queue.load_all().await.unwrap().remove(0);
    assert_eq!(item.attempt_count, 3);
    assert!(item.last_error.unwrap().contains("closed"));
}

#[tokio::test]
#[traced_test]
async fn test_item_at_ceiling_is_dead_lettered() {
    let h = harness().await;
    h.store.set_offline(true);
    h.writer().write_safe(&event()).await;

    let drainer = h.drainer(2);
    assert_eq!(drainer.drain_once().await.unwrap().dead_lettered, 0);
    let report = drainer.drain_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.dead_lettered, 1);
    assert!(h.queue.is_empty().await.unwrap());
    assert!(logs_contain("Dropping retry item"));

    // Primary comes back: nothing left to replay
    h.store.set_offline(false);
    assert_eq!(drainer.drain_once().await.unwrap(), DrainReport::default());
    assert!(h.stored_events().await.is_empty());

    let audit = h.audit.recent(10).await.unwrap();
    assert_eq!(audit[0].level, AuditLevel::Warning);
    assert!(audit[0].message.contains("after 2 attempts"));
}

#[tokio::test]
async fn test_item_already_over_ceiling_is_not_replayed() {
    let h = harness().await;
    let mut item = RetryQueueItem::wrap(&event()).unwrap();
    item.attempt_count = 10;
    h.queue.enqueue_item(&item).await.unwrap();

    let report = h.drainer(5).drain_once().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.replayed, 0);
    assert!(h.stored_events().await.is_empty());
}

#[tokio::test]
async fn test_unknown_payload_type_counts_as_failure() {
    let h = harness().await;
    let mut item = RetryQueueItem::wrap(&event()).unwrap();
    item.payload_type = "DeviceRecord".into();
    h.queue.enqueue_item(&item).await.unwrap();

    let report = h.drainer(5000).drain_once().await.unwrap();
    assert_eq!(report.failed, 1);
    let stored = h.queue.load_all().await.unwrap().remove(0);
    assert_eq!(stored.attempt_count, 1);
    assert!(stored.last_error.unwrap().contains("DeviceRecord"));
}

#[tokio::test]
async fn test_drainer_loop_replays_and_stops_on_cancel() {
    let h = harness().await;
    h.store.set_offline(true);
    h.writer().write_safe(&event()).await;
    h.store.set_offline(false);

    let drainer = Arc::new(h.drainer(5000));
    let token = CancellationToken::new();
    let task = {
        let drainer = drainer.clone();
        let token = token.clone();
        tokio::spawn(async move { drainer.run(token).await })
    };

    for _ in 0..50 {
        if h.queue.is_empty().await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(h.queue.is_empty().await.unwrap());
    assert_eq!(h.stored_events().await.len(), 1);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[traced_test]
async fn test_queue_error_on_one_item_does_not_end_the_cycle() {
    let fallback = memory_pool().await;
    schema::ensure_fallback_schema(&fallback).await.unwrap();
    let queue = RetryQueue::new(fallback.clone());
    let lines = InputVector::new(vec![true; 16]);
    queue
        .enqueue(&MachineEvent::from_inputs(1, &lines, None))
        .await
        .unwrap();
    queue
        .enqueue(&MachineEvent::from_inputs(2, &lines, None))
        .await
        .unwrap();

    let store = Arc::new(QueueClosingStore {
        fallback,
        upserts: AtomicUsize::new(0),
    });
    let drainer = RetryDrainer::new(
        store.clone(),
        queue,
        AuditLog::new(memory_pool().await),
        DrainerConfig::default(),
    );

    // Neither item can be deleted once replayed, yet both are replayed
    let report = drainer.drain_once().await.unwrap();
    assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
    assert_eq!(report.replayed, 0);
    assert_eq!(report.queue_errors, 2);
    assert!(logs_contain("Failed to remove retried item"));
}
