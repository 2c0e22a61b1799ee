//! Pulse I/O gateway service
//!
//! Watches a machine's digital input lines, classifies every change against
//! the rule table, records a machine event and drives the signal lamps.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Input module │──▶│ InputMonitor │──▶│ EventRecorder │──▶│OutputUpdater │
//! │ (supervised) │   │ (bounded q)  │   │ match + write │   │  + Blinker   │
//! └──────────────┘   └──────────────┘   └───────┬───────┘   └──────┬───────┘
//!                                               │                  ▼
//!                                               ▼           ┌──────────────┐
//!                                       ┌──────────────┐    │Output module │
//!                                       │ReliableWriter│    │ (supervised) │
//!                                       │ + RetryQueue │    └──────────────┘
//!                                       └──────────────┘
//! ```
//!
//! Background loops: one reconnect loop per device, the blink worker, the
//! retry drainer and the daily rule sync.

pub mod blink;
pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod supervisor;

pub use config::IoSrvConfig;
pub use error::{IoSrvError, Result};
pub use runtime::Gateway;
