//! Machine events recorded for every observed input change

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::input::InputVector;
use crate::record::Record;

/// One input snapshot translated into named machine signals.
///
/// Input lines 0..9 map onto the named fields in order; lines beyond the
/// snapshot length read as `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineEvent {
    pub id: i64,
    /// Matched rule, if any
    pub status_id: Option<i64>,
    pub machine_id: i64,
    pub timestamp: DateTime<Utc>,
    pub epoch_ms: i64,
    pub additional_information: Option<String>,

    pub spindle_running: bool,
    pub feed_hold: bool,
    pub dry_run: bool,
    pub m00_m01: bool,
    pub in_alarm: bool,
    pub in_cycle: bool,
    pub feedrate_less_than_100: bool,
    pub feed_rate_is_100: bool,
    pub feedrate_more_than_100: bool,
}

impl MachineEvent {
    /// Build an unsaved event from a snapshot and the rule it matched
    pub fn from_inputs(machine_id: i64, inputs: &InputVector, status_id: Option<i64>) -> Self {
        let timestamp = inputs.timestamp();
        Self {
            id: 0,
            status_id,
            machine_id,
            timestamp,
            epoch_ms: timestamp.timestamp_millis(),
            additional_information: None,
            spindle_running: inputs.line(0),
            feed_hold: inputs.line(1),
            dry_run: inputs.line(2),
            m00_m01: inputs.line(3),
            in_alarm: inputs.line(4),
            in_cycle: inputs.line(5),
            feedrate_less_than_100: inputs.line(6),
            feed_rate_is_100: inputs.line(7),
            feedrate_more_than_100: inputs.line(8),
        }
    }

    pub fn with_information(mut self, info: impl Into<String>) -> Self {
        self.additional_information = Some(info.into());
        self
    }
}

impl Record for MachineEvent {
    const TYPE_TAG: &'static str = "MachineEvent";

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn apply_from(&mut self, other: &Self) {
        let id = self.id;
        *self = other.clone();
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_fields_follow_line_order() {
        let lines = vec![true, false, false, true, false, true, false, true, false, true];
        let input = InputVector::new(lines);
        let event = MachineEvent::from_inputs(4, &input, Some(12));

        assert_eq!(event.id, 0);
        assert_eq!(event.machine_id, 4);
        assert_eq!(event.status_id, Some(12));
        assert!(event.spindle_running);
        assert!(!event.feed_hold);
        assert!(event.m00_m01);
        assert!(event.in_cycle);
        assert!(event.feed_rate_is_100);
        assert!(!event.feedrate_more_than_100);
        assert_eq!(event.epoch_ms, input.timestamp().timestamp_millis());
    }

    #[test]
    fn test_short_snapshot_defaults_to_false() {
        let input = InputVector::new(vec![true, true]);
        let event = MachineEvent::from_inputs(1, &input, None);
        assert!(event.spindle_running);
        assert!(event.feed_hold);
        assert!(!event.dry_run);
        assert!(!event.feedrate_more_than_100);
        assert_eq!(event.status_id, None);
    }
}
