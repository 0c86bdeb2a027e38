//! Cron schedule evaluation.
//!
//! Wraps the `cron` crate behind the one contract the scheduler needs:
//! given a 6-field expression (second minute hour day month day-of-week)
//! and a reference instant, produce the strictly-next fire time. Pure and
//! deterministic; callers supply the clock.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::error::{Result, SchedulerError};

/// Number of whitespace-separated fields a schedule must have.
const SCHEDULE_FIELDS: usize = 6;

/// Calculate the next fire time for a cron expression, strictly after
/// `from` (never equal to it).
///
/// # Errors
///
/// Returns [`SchedulerError::invalid_schedule`] when the expression is
/// blank, is not exactly 6 fields, fails to parse, or has no satisfiable
/// future instant (e.g. an impossible calendar date like Feb 30).
pub fn next_fire_time(schedule: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let trimmed = schedule.trim();
    if trimmed.is_empty() {
        return Err(SchedulerError::invalid_schedule(
            "expression cannot be blank",
        ));
    }

    let field_count = trimmed.split_whitespace().count();
    if field_count != SCHEDULE_FIELDS {
        return Err(SchedulerError::invalid_schedule(format!(
            "expected {} fields, got {}",
            SCHEDULE_FIELDS, field_count
        )));
    }

    let parsed = Schedule::from_str(trimmed)?;

    parsed.after(&from).next().ok_or_else(|| {
        SchedulerError::invalid_schedule("no future fire time satisfies the expression")
    })
}

/// Validate an expression without computing a fire time.
pub fn validate_schedule(schedule: &str) -> Result<()> {
    next_fire_time(schedule, Utc::now()).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_next_fire_hourly() {
        let next = next_fire_time("0 0 * * * *", at(2024, 1, 1, 10, 30, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 1, 11, 0, 0));
    }

    #[test]
    fn test_next_fire_strictly_after() {
        // A reference instant exactly on a fire point yields the following one.
        let next = next_fire_time("0 0 * * * *", at(2024, 1, 1, 11, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 1, 12, 0, 0));
    }

    #[test]
    fn test_next_fire_every_five_minutes() {
        let from = at(2024, 6, 15, 9, 3, 42);
        let next = next_fire_time("0 */5 * * * *", from).unwrap();
        assert_eq!(next, at(2024, 6, 15, 9, 5, 0));
        assert!(next > from);
    }

    #[test]
    fn test_deterministic() {
        let from = at(2024, 3, 10, 0, 0, 1);
        let a = next_fire_time("30 15 8 * * *", from).unwrap();
        let b = next_fire_time("30 15 8 * * *", from).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_blank_rejected() {
        assert!(next_fire_time("", Utc::now()).is_err());
        assert!(next_fire_time("   ", Utc::now()).is_err());
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        // 5-field Unix format is not accepted; the contract is 6 fields.
        assert!(next_fire_time("0 * * * *", Utc::now()).is_err());
        assert!(next_fire_time("0 0 * * * * 2099", Utc::now()).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(next_fire_time("a b c d e f", Utc::now()).is_err());
        assert!(next_fire_time("99 99 99 99 99 99", Utc::now()).is_err());
    }

    #[test]
    fn test_impossible_date_rejected() {
        // Feb 30 never exists, so no future instant satisfies it.
        assert!(next_fire_time("0 0 0 30 2 *", Utc::now()).is_err());
    }

    #[test]
    fn test_validate_schedule() {
        assert!(validate_schedule("0 0/5 * * * *").is_ok());
        assert!(validate_schedule("not a cron").is_err());
    }
}
