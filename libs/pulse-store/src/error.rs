//! Persistence Error Types

use errors::{ErrorCategory, GatewayErrorTrait};
use pulse_model::ModelError;
use pulse_rules::RuleError;
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// SQLite primary result codes for contention
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload could not be serialized or rebuilt
    #[error("Payload error: {0}")]
    Payload(#[from] ModelError),

    /// Retry envelope carries a type tag no replay handler knows
    #[error("Unknown payload type: {0}")]
    UnknownPayloadType(String),

    /// Row expected but missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller passed something the store cannot persist
    #[error("Invalid record: {0}")]
    Invalid(String),
}

impl From<RuleError> for StoreError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Database(e) => StoreError::Database(e),
            RuleError::NotFound(id) => StoreError::NotFound(format!("pattern mapping {}", id)),
            RuleError::InvalidArgument(msg) => StoreError::Invalid(msg),
        }
    }
}

impl StoreError {
    /// Expected store unavailability (retry later, log at warning)
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => is_transient_sqlx(e),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // Extended codes keep the primary code in the low byte
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

impl GatewayErrorTrait for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) if self.is_transient() => "STORE_UNAVAILABLE",
            Self::Database(_) => "STORE_DATABASE_ERROR",
            Self::Payload(_) => "STORE_PAYLOAD_ERROR",
            Self::UnknownPayloadType(_) => "STORE_UNKNOWN_PAYLOAD",
            Self::NotFound(_) => "STORE_NOT_FOUND",
            Self::Invalid(_) => "STORE_INVALID_RECORD",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Database(_) if self.is_transient() => ErrorCategory::Connection,
            Self::Database(_) => ErrorCategory::Database,
            Self::Payload(_) | Self::UnknownPayloadType(_) => ErrorCategory::Internal,
            Self::NotFound(_) => ErrorCategory::Database,
            Self::Invalid(_) => ErrorCategory::Validation,
        }
    }
}
