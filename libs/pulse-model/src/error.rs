//! Model Layer Error Types

use errors::{ErrorCategory, GatewayErrorTrait};
use thiserror::Error;

/// Result type for pulse-model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model layer errors
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl GatewayErrorTrait for ModelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "MODEL_SERIALIZATION",
            Self::Validation(_) => "MODEL_VALIDATION",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Serialization(_) => ErrorCategory::Internal,
            Self::Validation(_) => ErrorCategory::Validation,
        }
    }
}
