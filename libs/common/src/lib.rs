//! Pulse gateway basic library
//!
//! Provides basic functions shared by the gateway crates, including:
//! - logging functions
//! - graceful shutdown and supervised background tasks
//! - SQLite client
//! - command-line arguments and configuration loading

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod bootstrap_args;
pub mod config_loader;
pub mod logging;
pub mod shutdown;
pub mod tasks;

// Re-export common dependencies
pub use anyhow;
pub use tokio;
pub use tokio_util::sync::CancellationToken;

// Re-export CLI dependencies when cli feature is enabled
#[cfg(feature = "cli")]
pub use clap;

#[cfg(feature = "cli")]
pub use clap::Parser;

pub use tasks::TaskSupervisor;
