//! Unified error handling for the Pulse I/O gateway
//!
//! `GatewayError` is the top-level error surfaced by the service binary.
//! Library crates keep their own domain errors (`RuleError`, `StoreError`,
//! `IoSrvError`) and expose a common face through [`GatewayErrorTrait`].

use thiserror::Error;

// ============================================================================
// GatewayError - Main error type
// ============================================================================

/// Main error type for the gateway service
#[derive(Debug, Error)]
pub enum GatewayError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ======================================
    // Database Errors
    // ======================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // Device & Connection Errors
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Device error: {0}")]
    Device(String),

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Validation failed: {0}")]
    Validation(String),

    // ======================================
    // File & Serialization Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        GatewayErrorTrait::is_retryable(self)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl GatewayErrorTrait for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::Device(_) => "DEVICE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Database(_) | Self::Sqlite(_) => ErrorCategory::Database,
            Self::ConnectionFailed { .. } => ErrorCategory::Connection,
            Self::Device(_) => ErrorCategory::Device,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Gateway Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Database,

    // Hardware layer
    Connection,
    Device,

    // Contract violations
    Validation,

    // System level
    Internal,

    // Others
    Unknown,
}

/// Common capability trait for gateway error types
///
/// Each crate keeps its own domain error and gains a shared interface by
/// implementing this trait.
pub trait GatewayErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and audit entries)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Device
        )
    }

    /// Severity to log this error at.
    ///
    /// Unavailable hardware or stores are expected and log at `WARN`;
    /// everything else is unexpected and logs at `ERROR`.
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Connection | ErrorCategory::Device => Level::WARN,
            ErrorCategory::Configuration
            | ErrorCategory::Database
            | ErrorCategory::Validation
            | ErrorCategory::Internal
            | ErrorCategory::Unknown => Level::ERROR,
        }
    }
}
