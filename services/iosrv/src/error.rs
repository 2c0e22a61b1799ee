//! Error handling for the I/O gateway service

use errors::{ErrorCategory, GatewayError, GatewayErrorTrait};
use thiserror::Error;

/// I/O service error type
#[derive(Error, Debug, Clone)]
pub enum IoSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Endpoint could not be reached or dropped the session
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation needs a live session but the endpoint is down
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Device rejected or failed an operation
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Output index outside the device's range
    #[error("Invalid output index {index} (device has {count} outputs)")]
    InvalidIndex { index: usize, count: usize },

    /// Operation cancelled by the caller or shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// Storage errors
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the I/O service
pub type Result<T> = std::result::Result<T, IoSrvError>;

impl From<pulse_store::StoreError> for IoSrvError {
    fn from(err: pulse_store::StoreError) -> Self {
        IoSrvError::StorageError(err.to_string())
    }
}

impl From<pulse_rules::RuleError> for IoSrvError {
    fn from(err: pulse_rules::RuleError) -> Self {
        match err {
            pulse_rules::RuleError::InvalidArgument(msg) => IoSrvError::ConfigError(msg),
            other => IoSrvError::StorageError(other.to_string()),
        }
    }
}

impl From<IoSrvError> for GatewayError {
    fn from(err: IoSrvError) -> Self {
        match err {
            IoSrvError::ConfigError(msg) => GatewayError::Configuration(msg),
            IoSrvError::ConnectionError(reason) | IoSrvError::NotConnected(reason) => {
                GatewayError::ConnectionFailed {
                    endpoint: "io-module".to_string(),
                    reason,
                }
            },
            IoSrvError::DeviceError(msg) => GatewayError::Device(msg),
            IoSrvError::StorageError(msg) => GatewayError::Database(msg),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl GatewayErrorTrait for IoSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "IOSRV_CONFIG",
            Self::ConnectionError(_) => "IOSRV_CONNECTION",
            Self::NotConnected(_) => "IOSRV_NOT_CONNECTED",
            Self::DeviceError(_) => "IOSRV_DEVICE",
            Self::InvalidIndex { .. } => "IOSRV_INVALID_INDEX",
            Self::Cancelled => "IOSRV_CANCELLED",
            Self::StorageError(_) => "IOSRV_STORAGE",
            Self::InternalError(_) => "IOSRV_INTERNAL",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError(_) => ErrorCategory::Configuration,
            Self::ConnectionError(_) | Self::NotConnected(_) => ErrorCategory::Connection,
            Self::DeviceError(_) => ErrorCategory::Device,
            Self::InvalidIndex { .. } => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Internal,
            Self::StorageError(_) => ErrorCategory::Database,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_retryable() {
        assert!(IoSrvError::ConnectionError("refused".into()).is_retryable());
        assert!(IoSrvError::NotConnected("10.0.0.5:9500".into()).is_retryable());
        assert!(!IoSrvError::ConfigError("bad".into()).is_retryable());
    }

    #[test]
    fn test_short_input_maps_to_config_error() {
        let err: IoSrvError = pulse_rules::RuleError::InvalidArgument("too short".into()).into();
        assert!(matches!(err, IoSrvError::ConfigError(_)));
    }

    #[test]
    fn test_into_gateway_error() {
        let err: GatewayError = IoSrvError::DeviceError("write rejected".into()).into();
        assert!(matches!(err, GatewayError::Device(_)));
    }
}
