//! Common command-line arguments for the gateway services
//!
//! Provides a unified argument structure that individual binaries can flatten
//! into their own `clap` parser.

#[cfg(feature = "cli")]
use clap::Parser;
use std::path::PathBuf;

/// Common service startup arguments
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Configuration file (YAML)
    #[cfg_attr(
        feature = "cli",
        clap(short = 'c', long, default_value = "config/iosrv.yaml", env = "IOSRV_CONFIG")
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[cfg_attr(
        feature = "cli",
        clap(short = 'l', long, default_value = "info", env = "RUST_LOG")
    )]
    pub log_level: String,

    /// Log directory override
    #[cfg_attr(feature = "cli", clap(long, env = "PULSE_LOG_DIR"))]
    pub log_dir: Option<PathBuf>,

    /// Write file logs as JSON
    #[cfg_attr(feature = "cli", clap(long))]
    pub json_logs: bool,

    /// Disable colored output (useful for log files)
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config/iosrv.yaml"),
            log_level: "info".to_string(),
            log_dir: None,
            json_logs: false,
            no_color: false,
            validate: false,
        }
    }
}

impl ServiceArgs {
    /// Parse log level string to tracing::Level
    pub fn parse_log_level(&self) -> tracing::Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    /// Log directory with fallback to the shared log root
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(crate::logging::get_log_root)
    }
}
