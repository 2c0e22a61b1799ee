//! Snapshot pipeline
//!
//! ```text
//! InputDevice ──▶ InputMonitor ──(bounded mpsc)──▶ EventRecorder ──▶ OutputUpdater
//!                                                       │                  │
//!                                                       ▼                  ▼
//!                                                ReliableWriter     BlinkController
//! ```

mod monitor;
mod outputs;
mod recorder;

use std::sync::Arc;

use pulse_rules::PatternCache;
use pulse_store::sync::SyncSummary;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use monitor::InputMonitor;
pub use outputs::{final_values, BlinkTiming, OutputUpdater};
pub use recorder::{EventRecorder, Outcome};

/// Reload the rule cache whenever a sync run changed the local copy
pub async fn refresh_rules_on_sync(
    cache: Arc<PatternCache>,
    mut summaries: broadcast::Receiver<SyncSummary>,
    token: CancellationToken,
) {
    loop {
        let summary = tokio::select! {
            summary = summaries.recv() => summary,
            _ = token.cancelled() => break,
        };
        match summary {
            Ok(summary) if summary.changed() => match cache.reload().await {
                Ok(count) => info!("Rule table refreshed after sync ({} rules)", count),
                Err(e) => error!("Failed to reload rules after sync: {}", e),
            },
            Ok(_) => {},
            Err(RecvError::Lagged(n)) => {
                warn!("Missed {} sync summaries, reloading rules", n);
                if let Err(e) = cache.reload().await {
                    error!("Failed to reload rules after sync: {}", e);
                }
            },
            Err(RecvError::Closed) => break,
        }
    }
}
