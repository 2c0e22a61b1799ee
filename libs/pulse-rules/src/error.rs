//! Rule Engine Error Types

use errors::{ErrorCategory, GatewayErrorTrait};
use thiserror::Error;

/// Result type for rule operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Rule engine errors
#[derive(Debug, Error)]
pub enum RuleError {
    /// Caller violated the matcher contract (e.g. too few inputs)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Rule not found
    #[error("Rule not found: {0}")]
    NotFound(i64),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GatewayErrorTrait for RuleError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "RULE_INVALID_ARGUMENT",
            Self::NotFound(_) => "RULE_NOT_FOUND",
            Self::Database(_) => "RULE_DATABASE_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::Configuration,
            Self::Database(_) => ErrorCategory::Database,
        }
    }
}
