//! Pulse Store - Resilient Persistence Library
//!
//! Keeps every observed machine event even while the primary store is down:
//! - Upsert-by-key record stores with in-place retry of transient failures
//! - `ReliableWriter`: write to primary, queue a copy on failure
//! - Content-addressed retry queue in the local fallback store
//! - `RetryDrainer`: periodic replay with dead-lettering
//! - Audit log of replay and dead-letter decisions
//! - Scheduled primary to fallback reconciliation of configuration tables
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  ok   ┌──────────────────┐
//! │ ReliableWriter │──────▶│  Primary store   │◀─────────┐
//! └────────────────┘       └──────────────────┘          │ replay
//!         │ fail                    │ sync (daily)       │
//!         ▼                         ▼                    │
//! ┌────────────────┐       ┌──────────────────┐   ┌──────────────┐
//! │  RetryQueue    │──────▶│  Fallback store  │   │ RetryDrainer │
//! │ (hash dedup)   │       │ (rules + queue)  │──▶│  (interval)  │
//! └────────────────┘       └──────────────────┘   └──────────────┘
//! ```

mod audit;
mod drainer;
mod entity;
mod error;
mod retry_queue;
pub mod schema;
mod store;
pub mod sync;
mod writer;

// Re-export public API
pub use audit::{AuditLog, LOG_ENTRIES_TABLE};
pub use drainer::{
    DrainReport, DrainerConfig, ReplayKind, RetryDrainer, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_INTERVAL_SECS,
};
pub use entity::{SqlEntity, MACHINE_EVENTS_TABLE};
pub use error::{Result, StoreError};
pub use retry_queue::{RetryQueue, RETRY_QUEUE_TABLE};
pub use store::{ExecutionRetry, RecordStore, SqlRecordStore};
pub use writer::ReliableWriter;
