//! Event recording stage
//!
//! The single sequential consumer of input snapshots: classify, persist the
//! machine event, then drive the lamps. Snapshots are handled one at a time
//! in arrival order.

use std::sync::Arc;

use pulse_model::{InputVector, MachineEvent};
use pulse_rules::PatternCache;
use pulse_store::{RecordStore, ReliableWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::outputs::OutputUpdater;

/// What happened to one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Identical to the previous snapshot and suppression is on
    Duplicate,
    Recorded {
        matched: Option<i64>,
        /// `false` when the event went to the retry queue
        stored: bool,
    },
}

pub struct EventRecorder<S: RecordStore> {
    machine_id: i64,
    cache: Arc<PatternCache>,
    writer: ReliableWriter<S>,
    outputs: Arc<OutputUpdater>,
    suppress_duplicates: bool,
    input_names: Vec<String>,
    last: Option<InputVector>,
}

impl<S: RecordStore> EventRecorder<S> {
    pub fn new(
        machine_id: i64,
        cache: Arc<PatternCache>,
        writer: ReliableWriter<S>,
        outputs: Arc<OutputUpdater>,
    ) -> Self {
        Self {
            machine_id,
            cache,
            writer,
            outputs,
            suppress_duplicates: false,
            input_names: Vec::new(),
            last: None,
        }
    }

    /// Skip snapshots whose lines equal the previous one
    pub fn suppress_duplicates(mut self, enabled: bool) -> Self {
        self.suppress_duplicates = enabled;
        self
    }

    /// Labels used when logging which lines are active
    pub fn input_names(mut self, names: Vec<String>) -> Self {
        self.input_names = names;
        self
    }

    /// Consume snapshots until the channel closes or `token` fires
    pub async fn run(mut self, mut rx: mpsc::Receiver<InputVector>, token: CancellationToken) {
        info!(
            "Event recorder started for machine {} (duplicate suppression {})",
            self.machine_id,
            if self.suppress_duplicates { "on" } else { "off" }
        );

        loop {
            let snapshot = tokio::select! {
                snapshot = rx.recv() => snapshot,
                _ = token.cancelled() => {
                    info!("Event recorder received shutdown signal");
                    break;
                }
            };
            let Some(snapshot) = snapshot else {
                info!("Snapshot channel closed, event recorder stopping");
                break;
            };
            self.process(snapshot).await;
        }
    }

    pub async fn process(&mut self, snapshot: InputVector) -> Outcome {
        if self.suppress_duplicates
            && self
                .last
                .as_ref()
                .is_some_and(|last| last.same_lines(&snapshot))
        {
            debug!("Skipping unchanged snapshot {}", snapshot);
            return Outcome::Duplicate;
        }

        debug!("Active inputs: [{}]", active_lines(&self.input_names, &snapshot));
        let matched = match self.cache.match_inputs(snapshot.values()).await {
            Ok(matched) => matched,
            Err(e) => {
                error!("Failed to classify inputs {}: {}", snapshot, e);
                None
            },
        };

        let event = MachineEvent::from_inputs(
            self.machine_id,
            &snapshot,
            matched.as_ref().map(|m| m.id),
        );
        let stored = self.writer.write_safe(&event).await;
        if stored {
            info!("Event recorded at {}", event.timestamp);
        }

        match &matched {
            Some(mapping) => {
                info!("Matched pattern {} for inputs {}", mapping.id, snapshot);
                self.outputs.update(mapping).await;
            },
            None => info!("No pattern matched for inputs {}", snapshot),
        }

        self.last = Some(snapshot);
        Outcome::Recorded {
            matched: matched.map(|m| m.id),
            stored,
        }
    }
}

/// Labels of the lines that are on; unlabeled lines read `in{index}`
fn active_lines(names: &[String], snapshot: &InputVector) -> String {
    snapshot
        .values()
        .iter()
        .enumerate()
        .filter(|(_, &on)| on)
        .map(|(i, _)| match names.get(i) {
            Some(name) => name.clone(),
            None => format!("in{}", i),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
