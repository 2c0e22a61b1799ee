//! Scheduled reconciliation job

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::schedule::next_daily_run;
use super::table::{SyncReport, SyncTable};

/// Default wall-clock hour for the daily run
pub const DEFAULT_SYNC_HOUR: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct SyncSchedule {
    pub hour: u32,
    pub run_on_startup: bool,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            hour: DEFAULT_SYNC_HOUR,
            run_on_startup: true,
        }
    }
}

/// Result of syncing every configured table once
#[derive(Debug, Default, Clone)]
pub struct SyncSummary {
    pub tables: Vec<(&'static str, SyncReport)>,
    pub failed: Vec<&'static str>,
}

impl SyncSummary {
    /// True when any table's secondary copy changed
    pub fn changed(&self) -> bool {
        self.tables.iter().any(|(_, r)| !r.is_noop())
    }
}

pub struct SyncJob {
    primary: SqlitePool,
    secondary: SqlitePool,
    tables: Vec<Arc<dyn SyncTable>>,
    schedule: SyncSchedule,
    completed: broadcast::Sender<SyncSummary>,
}

impl SyncJob {
    pub fn new(primary: SqlitePool, secondary: SqlitePool, schedule: SyncSchedule) -> Self {
        let (completed, _) = broadcast::channel(4);
        Self {
            primary,
            secondary,
            tables: Vec::new(),
            schedule,
            completed,
        }
    }

    pub fn with_table(mut self, table: impl SyncTable + 'static) -> Self {
        self.tables.push(Arc::new(table));
        self
    }

    /// Notified after every completed run
    pub fn subscribe(&self) -> broadcast::Receiver<SyncSummary> {
        self.completed.subscribe()
    }

    /// Sync every table once; one table failing does not stop the rest
    pub async fn run_sync(&self) -> SyncSummary {
        let mut summary = SyncSummary::default();

        for table in &self.tables {
            match table.sync(&self.primary, &self.secondary).await {
                Ok(report) => {
                    info!(
                        "Synced table {} ({} inserted, {} updated, {} deleted)",
                        table.name(),
                        report.inserted,
                        report.updated,
                        report.deleted
                    );
                    summary.tables.push((table.name(), report));
                },
                Err(e) => {
                    error!("Failed to sync table {}: {}", table.name(), e);
                    summary.failed.push(table.name());
                },
            }
        }

        // No subscribers is fine
        let _ = self.completed.send(summary.clone());
        summary
    }

    /// Run at startup (if configured), then daily at the configured hour
    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Sync job started for {} tables, daily at {:02}:00",
            self.tables.len(),
            self.schedule.hour
        );

        if self.schedule.run_on_startup {
            tokio::select! {
                _ = self.run_sync() => {}
                _ = token.cancelled() => return,
            }
        }

        loop {
            let now = Local::now();
            let Some(next) = next_daily_run(&now, self.schedule.hour) else {
                warn!("Invalid sync hour {}, sync job stopping", self.schedule.hour);
                return;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!("Next sync at {}", next.format("%Y-%m-%d %H:%M:%S"));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.run_sync().await;
                }
                _ = token.cancelled() => {
                    info!("Sync job received shutdown signal");
                    break;
                }
            }
        }
    }
}
