//! Input line snapshots

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of every digital input line at one instant.
///
/// Cloning is cheap; the line states are shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputVector {
    values: Arc<[bool]>,
    captured_at: DateTime<Utc>,
}

impl InputVector {
    /// Snapshot captured now
    pub fn new(values: impl Into<Vec<bool>>) -> Self {
        Self::captured_at(values, Utc::now())
    }

    /// Snapshot with an explicit capture time
    pub fn captured_at(values: impl Into<Vec<bool>>, at: DateTime<Utc>) -> Self {
        Self {
            values: Arc::from(values.into()),
            captured_at: at,
        }
    }

    pub fn values(&self) -> &[bool] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Line state, `false` for indexes past the end
    pub fn line(&self, index: usize) -> bool {
        self.values.get(index).copied().unwrap_or(false)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Same line states, capture time ignored
    pub fn same_lines(&self, other: &InputVector) -> bool {
        self.values == other.values
    }
}

impl PartialEq for InputVector {
    fn eq(&self, other: &Self) -> bool {
        self.same_lines(other) && self.captured_at == other.captured_at
    }
}

impl std::fmt::Display for InputVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for v in self.values.iter() {
            f.write_str(if *v { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_past_end_is_false() {
        let input = InputVector::new(vec![true, false, true]);
        assert!(input.line(0));
        assert!(!input.line(1));
        assert!(!input.line(42));
        assert_eq!(input.len(), 3);
    }

    #[test]
    fn test_same_lines_ignores_time() {
        let a = InputVector::captured_at(vec![true, false], Utc::now());
        let b = InputVector::captured_at(vec![true, false], Utc::now() + chrono::Duration::seconds(5));
        assert!(a.same_lines(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_as_bits() {
        let input = InputVector::new(vec![true, false, false, true]);
        assert_eq!(input.to_string(), "1001");
    }
}
