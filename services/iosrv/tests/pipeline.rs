//! Snapshot pipeline: monitor, recorder and output stage together
//!
//! Uses the simulated I/O module behind real supervisors and single
//! connection in-memory SQLite stores.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;

use iosrv::blink::BlinkController;
use iosrv::config::BlinkMode;
use iosrv::device::{InputDevice, OutputDevice, SimulatedIoModule, SupervisedIo};
use iosrv::pipeline::{BlinkTiming, EventRecorder, InputMonitor, Outcome, OutputUpdater};
use iosrv::supervisor::ConnectionSupervisor;
use pulse_model::{InputVector, PatternMapping};
use pulse_rules::PatternCache;
use pulse_store::{schema, ExecutionRetry, ReliableWriter, RetryQueue, SqlRecordStore};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

const OUTPUTS: usize = 16;

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Red lamp when the spindle runs, green when it does not
fn rules() -> Vec<PatternMapping> {
    let mut spindle = [None; 9];
    spindle[0] = Some(true);
    let mut idle = [None; 9];
    idle[0] = Some(false);
    idle[5] = Some(false);
    vec![
        PatternMapping::new(1, spindle, [true, false, false]).with_status("Running", "Red"),
        PatternMapping::new(2, idle, [false, false, true]).with_status("Idle", "Green"),
    ]
}

struct Harness {
    token: CancellationToken,
    primary: SqlitePool,
    queue: RetryQueue,
    output_module: Arc<SimulatedIoModule>,
    output_supervisor: Arc<ConnectionSupervisor>,
    blinker: Arc<BlinkController>,
    recorder: EventRecorder<SqlRecordStore>,
}

impl Harness {
    async fn new() -> Self {
        let token = CancellationToken::new();

        let primary = memory_pool().await;
        schema::ensure_primary_schema(&primary).await.unwrap();
        let fallback = memory_pool().await;
        schema::ensure_fallback_schema(&fallback).await.unwrap();
        for rule in rules() {
            pulse_rules::insert_mapping(&fallback, &rule).await.unwrap();
        }

        let store = Arc::new(SqlRecordStore::with_retry(
            primary.clone(),
            ExecutionRetry::none(),
        ));
        let queue = RetryQueue::new(fallback.clone());
        let writer = ReliableWriter::new(store, queue.clone());
        let cache = Arc::new(PatternCache::from_pool(fallback));

        let output_module = SimulatedIoModule::new("sim:out", 0, OUTPUTS);
        let output_supervisor = ConnectionSupervisor::new(
            "output",
            output_module.clone(),
            Duration::from_millis(50),
            &token,
        );
        let output: Arc<dyn OutputDevice> = Arc::new(SupervisedIo::new(
            output_module.clone(),
            output_supervisor.clone(),
        ));

        let blinker = Arc::new(BlinkController::new(BlinkMode::Toggle, &token));
        let outputs = Arc::new(OutputUpdater::new(
            output,
            blinker.clone(),
            BlinkTiming {
                period: Duration::from_millis(10),
                duration: Duration::from_millis(50),
            },
            OUTPUTS,
            token.child_token(),
        ));
        outputs.start().await.unwrap();

        let recorder = EventRecorder::new(7, cache, writer, outputs);
        Self {
            token,
            primary,
            queue,
            output_module,
            output_supervisor,
            blinker,
            recorder,
        }
    }

    async fn event_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM machine_events")
            .fetch_one(&self.primary)
            .await
            .unwrap()
    }

    /// Wait until the output module shows `expected`
    async fn settled_on(&self, expected: &[bool]) -> bool {
        for _ in 0..100 {
            if self.output_module.outputs() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn shutdown(self) {
        self.blinker.shutdown().await;
        self.output_supervisor.shutdown().await;
        self.token.cancel();
    }
}

/// Nine classification lines, so the matcher sees a single window
fn snapshot(on: &[usize]) -> InputVector {
    InputVector::new(lines(9, on))
}

fn lines(count: usize, on: &[usize]) -> Vec<bool> {
    let mut values = vec![false; count];
    for &i in on {
        values[i] = true;
    }
    values
}

fn padded(lamps: [bool; 3]) -> Vec<bool> {
    let mut values = lamps.to_vec();
    values.resize(OUTPUTS, false);
    values
}

#[tokio::test]
async fn test_matched_snapshot_is_recorded_and_drives_lamps() {
    let mut harness = Harness::new().await;

    let outcome = harness.recorder.process(snapshot(&[0, 5])).await;
    assert_eq!(
        outcome,
        Outcome::Recorded {
            matched: Some(1),
            stored: true,
        }
    );
    assert_eq!(harness.event_count().await, 1);
    assert!(harness.settled_on(&padded([true, false, false])).await);

    // Lamps lit now blink, then settle on the next rule's outputs
    harness.recorder.process(snapshot(&[])).await;
    assert!(harness.settled_on(&padded([false, false, true])).await);
    assert_eq!(harness.event_count().await, 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_recorded_event_carries_machine_and_rule() {
    let mut harness = Harness::new().await;
    harness.recorder.process(snapshot(&[0, 1])).await;

    let (machine_id, status_id, spindle, feed_hold): (i64, Option<i64>, bool, bool) =
        sqlx::query_as(
            "SELECT machine_id, status_id, spindle_running, feed_hold FROM machine_events",
        )
        .fetch_one(&harness.primary)
        .await
        .unwrap();
    assert_eq!(machine_id, 7);
    assert_eq!(status_id, Some(1));
    assert!(spindle);
    assert!(feed_hold);

    harness.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_unmatched_snapshot_leaves_outputs_alone() {
    let mut harness = Harness::new().await;

    // Spindle off but in cycle: neither rule applies
    let outcome = harness.recorder.process(snapshot(&[5])).await;
    assert_eq!(
        outcome,
        Outcome::Recorded {
            matched: None,
            stored: true,
        }
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.output_module.outputs(), vec![false; OUTPUTS]);
    assert!(logs_contain("No pattern matched"));

    harness.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_primary_outage_queues_event_without_interrupting() {
    let mut harness = Harness::new().await;
    harness.primary.close().await;

    let outcome = harness.recorder.process(snapshot(&[0])).await;
    assert_eq!(
        outcome,
        Outcome::Recorded {
            matched: Some(1),
            stored: false,
        }
    );
    assert_eq!(harness.queue.len().await.unwrap(), 1);
    assert!(logs_contain("Primary store unavailable"));
    // Lamps still follow the matched rule
    assert!(harness.settled_on(&padded([true, false, false])).await);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_suppression_is_opt_in() {
    let mut harness = Harness::new().await;
    let first = harness.recorder.process(snapshot(&[0])).await;
    let again = harness.recorder.process(snapshot(&[0])).await;
    assert_eq!(first, again);
    assert_eq!(harness.event_count().await, 2);
    harness.shutdown().await;

    let mut harness = Harness::new().await;
    harness.recorder = harness.recorder.suppress_duplicates(true);

    harness.recorder.process(snapshot(&[0])).await;
    assert_eq!(
        harness.recorder.process(snapshot(&[0])).await,
        Outcome::Duplicate
    );
    assert!(matches!(
        harness.recorder.process(snapshot(&[])).await,
        Outcome::Recorded { .. }
    ));
    assert_eq!(harness.event_count().await, 2);

    harness.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_full_channel_drops_newest_snapshot() {
    let token = CancellationToken::new();
    let module = SimulatedIoModule::new("sim:in", 16, 0);
    let supervisor =
        ConnectionSupervisor::new("input", module.clone(), Duration::from_millis(50), &token);
    let device: Arc<dyn InputDevice> = Arc::new(SupervisedIo::new(module, supervisor.clone()));

    let (tx, mut rx) = mpsc::channel(1);
    let monitor = InputMonitor::new(device, tx);

    assert!(monitor.forward(snapshot(&[0])));
    assert!(!monitor.forward(snapshot(&[1])));
    assert!(logs_contain("Dropped input snapshot because channel is full"));

    // The accepted snapshot is the first one
    assert!(rx.recv().await.unwrap().line(0));
    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_monitor_forwards_startup_read_then_changes_in_order() {
    let token = CancellationToken::new();
    let module = SimulatedIoModule::new("sim:in", 16, 0);
    let supervisor = ConnectionSupervisor::new(
        "input",
        module.clone(),
        Duration::from_millis(50),
        &token,
    );
    let device: Arc<dyn InputDevice> =
        Arc::new(SupervisedIo::new(module.clone(), supervisor.clone()));

    let (tx, mut rx) = mpsc::channel(16);
    let monitor = tokio::spawn(InputMonitor::new(device, tx).run(token.child_token()));

    let startup = rx.recv().await.unwrap();
    assert_eq!(startup.values(), &[false; 16]);

    module.set_inputs(lines(16, &[2]));
    module.set_inputs(lines(16, &[3]));
    assert!(rx.recv().await.unwrap().line(2));
    assert!(rx.recv().await.unwrap().line(3));

    token.cancel();
    monitor.await.unwrap();
    supervisor.shutdown().await;
}
