//! Primary to secondary reconciliation
//!
//! For every configured table the secondary copy is made equal to the
//! primary: missing rows inserted, rows with a different content hash
//! updated, rows gone from the primary deleted. One transaction per table.

mod job;
mod schedule;
mod table;

pub use job::{SyncJob, SyncSchedule, SyncSummary, DEFAULT_SYNC_HOUR};
pub use schedule::next_daily_run;
pub use table::{EntitySync, SyncReport, SyncTable};
