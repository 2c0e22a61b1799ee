//! Audit log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity stored with an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditLevel {
    Information,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Information => "Information",
            AuditLevel::Warning => "Warning",
            AuditLevel::Error => "Error",
        }
    }
}

impl std::str::FromStr for AuditLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Information" => Ok(AuditLevel::Information),
            "Warning" => Ok(AuditLevel::Warning),
            "Error" => Ok(AuditLevel::Error),
            other => Err(format!("unknown audit level '{}'", other)),
        }
    }
}

/// One operator-visible audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp_utc: DateTime<Utc>,
    pub message: String,
    pub level: AuditLevel,
}

impl LogEntry {
    pub fn new(level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp_utc: Utc::now(),
            message: message.into(),
            level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_text_round_trip() {
        for level in [AuditLevel::Information, AuditLevel::Warning, AuditLevel::Error] {
            assert_eq!(level.as_str().parse::<AuditLevel>(), Ok(level));
        }
        assert!("Debug".parse::<AuditLevel>().is_err());
    }
}
