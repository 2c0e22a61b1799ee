//! Daily wall-clock schedule

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone};

/// Step used to walk out of a DST gap
const GAP_STEP_MINUTES: i64 = 15;

/// Next instant strictly after `now` at `hour:00:00` local time.
///
/// A start time that falls into a DST gap moves forward to the first valid
/// instant after it. Returns `None` when `hour > 23`.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let mut date = now.date_naive();

    // Today, tomorrow, and one spare day for a gap that swallows a whole run
    for _ in 0..3 {
        let candidate = resolve_local(&tz, date.and_hms_opt(hour, 0, 0)?)?;
        if candidate > *now {
            return Some(candidate);
        }
        date = date.succ_opt()?;
    }
    None
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, mut naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    for _ in 0..(24 * 60 / GAP_STEP_MINUTES) {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => return Some(t),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest),
            LocalResult::None => naive += Duration::minutes(GAP_STEP_MINUTES),
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike, Utc};

    #[test]
    fn test_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 1, 30, 0).unwrap();
        let next = next_daily_run(&now, 2).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_exactly_at_hour_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap();
        let next = next_daily_run(&now, 2).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 11, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_month_end_rollover() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let next = next_daily_run(&now, 2).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_keeps_caller_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        let next = next_daily_run(&now, 2).unwrap();
        assert_eq!(next.hour(), 2);
        assert_eq!(next.offset(), &tz);
        assert_eq!(next - now, Duration::hours(17));
    }

    #[test]
    fn test_invalid_hour() {
        let now = Utc::now();
        assert!(next_daily_run(&now, 24).is_none());
    }
}
