//! Pulse Model Library
//!
//! Plain data types shared by the rule engine, the persistence layer and the
//! gateway service. Nothing here performs I/O.
//!
//! # Modules
//!
//! - `input`: immutable input-line snapshots
//! - `pattern`: rule table rows (`PatternMapping`) and their content hash
//! - `event`: `MachineEvent` records built from snapshots
//! - `retry`: durable retry-queue envelopes
//! - `audit`: audit log entries
//! - `record`: the per-entity key / clone / apply contract used by upserts

pub mod audit;
pub mod error;
pub mod event;
pub mod hash;
pub mod input;
pub mod pattern;
pub mod record;
pub mod retry;

// Re-exports for convenience
pub use audit::{AuditLevel, LogEntry};
pub use error::{ModelError, Result};
pub use event::MachineEvent;
pub use hash::sha256_hex;
pub use input::InputVector;
pub use pattern::{PatternMapping, CLASSIFICATION_BITS, DEFAULT_STATUS, OUTPUT_BITS};
pub use record::{Record, SyncEntity};
pub use retry::RetryQueueItem;
