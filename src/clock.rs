//! Cycle-boundary arithmetic.
//!
//! Pure functions that decide whether a given day is an execution day and
//! which cycle boundary it belongs to. All arithmetic is calendar-day
//! granularity; wall-clock time never participates. Re-running any of these
//! functions with the same inputs yields the same answer, which is what makes
//! a crashed run safely re-invocable on the same day.

use chrono::{Duration, NaiveDate};
use thiserror::Error;

/// Errors from date handling.
#[derive(Debug, Error)]
pub enum ClockError {
    /// A date string did not parse under the configured format.
    #[error("invalid date {value:?} for format {format:?}")]
    InvalidDate { value: String, format: String },
}

/// Result type for clock operations.
pub type ClockResult<T> = Result<T, ClockError>;

/// The cycle boundary a day belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleBoundary {
    /// The most recent boundary at or before the reference day.
    pub current: NaiveDate,

    /// The following boundary (`current + cycle_days`).
    pub next: NaiveDate,
}

/// Parses a date string under the given chrono format.
pub fn parse_date(value: &str, format: &str) -> ClockResult<NaiveDate> {
    NaiveDate::parse_from_str(value, format).map_err(|_| ClockError::InvalidDate {
        value: value.to_string(),
        format: format.to_string(),
    })
}

/// Formats a date under the given chrono format.
///
/// The format must have been validated beforehand (config load does a
/// round-trip probe), so formatting here cannot fail.
pub fn format_date(date: NaiveDate, format: &str) -> String {
    date.format(format).to_string()
}

/// Builds the name of the date-branch for a cycle boundary.
pub fn branch_name(prefix: &str, date: NaiveDate, format: &str) -> String {
    format!("{}{}", prefix, format_date(date, format))
}

/// Number of calendar days from `earlier` to `later` (negative if reversed).
pub fn days_between(later: NaiveDate, earlier: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// True when `today` is a scheduled execution day.
///
/// Bootstrap rule: with no prior cycle on record, any day is an execution
/// day. Otherwise a full cycle must have elapsed since the last one.
pub fn is_execution_day(today: NaiveDate, last_cycle: Option<NaiveDate>, cycle_days: u32) -> bool {
    match last_cycle {
        None => true,
        Some(last) => days_between(today, last) >= i64::from(cycle_days),
    }
}

/// Computes the cycle boundary `today` falls in.
///
/// With no prior cycle, today itself starts the cycle. Otherwise the boundary
/// snaps backward to the most recent multiple of `cycle_days` after the last
/// recorded cycle, so re-running any day before the next boundary recomputes
/// the same `current`. The step count uses Euclidean division: a reference
/// day before the recorded cycle date still snaps to a boundary at or before
/// that day rather than one in its future.
pub fn cycle_boundary(
    today: NaiveDate,
    last_cycle: Option<NaiveDate>,
    cycle_days: u32,
) -> CycleBoundary {
    let span = Duration::days(i64::from(cycle_days));
    match last_cycle {
        None => CycleBoundary {
            current: today,
            next: today + span,
        },
        Some(last) => {
            let elapsed = days_between(today, last);
            let steps = elapsed.div_euclid(i64::from(cycle_days));
            let current = last + Duration::days(steps * i64::from(cycle_days));
            CycleBoundary {
                current,
                next: current + span,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn arb_date() -> impl Strategy<Value = NaiveDate> {
        // Any day between 2000-01-01 and ~2100.
        (0i64..36_500).prop_map(|offset| date("2000-01-01") + Duration::days(offset))
    }

    proptest! {
        #[test]
        fn next_is_current_plus_cycle(
            today in arb_date(),
            last in proptest::option::of(arb_date()),
            cycle_days in 1u32..120,
        ) {
            let boundary = cycle_boundary(today, last, cycle_days);
            prop_assert_eq!(
                boundary.next,
                boundary.current + Duration::days(i64::from(cycle_days))
            );
        }

        #[test]
        fn boundary_is_idempotent(
            today in arb_date(),
            last in proptest::option::of(arb_date()),
            cycle_days in 1u32..120,
        ) {
            let first = cycle_boundary(today, last, cycle_days);
            let second = cycle_boundary(today, last, cycle_days);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn current_never_after_today(
            today in arb_date(),
            last in arb_date(),
            cycle_days in 1u32..120,
        ) {
            let boundary = cycle_boundary(today, Some(last), cycle_days);
            prop_assert!(boundary.current <= today);
            prop_assert!(boundary.next > today);
        }

        #[test]
        fn execution_day_false_strictly_inside_cycle(
            last in arb_date(),
            cycle_days in 1u32..120,
            offset in 0i64..120,
        ) {
            let offset = offset % i64::from(cycle_days);
            let today = last + Duration::days(offset);
            // Strictly between a boundary and boundary + cycle_days.
            if offset > 0 {
                prop_assert!(!is_execution_day(today, Some(last), cycle_days));
            }
            // At and after the next boundary.
            let at_boundary = last + Duration::days(i64::from(cycle_days));
            prop_assert!(is_execution_day(at_boundary, Some(last), cycle_days));
            prop_assert!(is_execution_day(at_boundary + Duration::days(1), Some(last), cycle_days));
        }
    }

    #[test]
    fn bootstrap_treats_any_day_as_execution_day() {
        assert!(is_execution_day(date("2025-09-01"), None, 14));
        let boundary = cycle_boundary(date("2025-09-01"), None, 14);
        assert_eq!(boundary.current, date("2025-09-01"));
        assert_eq!(boundary.next, date("2025-09-15"));
    }

    #[test]
    fn mid_cycle_day_is_not_execution_day() {
        assert!(!is_execution_day(
            date("2025-09-10"),
            Some(date("2025-09-01")),
            14
        ));
    }

    #[test]
    fn boundary_snaps_back_over_skipped_cycles() {
        // Two full cycles plus three days elapsed: snap to the second boundary.
        let boundary = cycle_boundary(date("2025-09-01") + Duration::days(31), Some(date("2025-09-01")), 14);
        assert_eq!(boundary.current, date("2025-09-29"));
        assert_eq!(boundary.next, date("2025-10-13"));
    }

    #[test]
    fn boundary_on_the_day_itself_is_current() {
        let boundary = cycle_boundary(date("2025-09-15"), Some(date("2025-09-01")), 14);
        assert_eq!(boundary.current, date("2025-09-15"));
        assert_eq!(boundary.next, date("2025-09-29"));
    }

    #[test]
    fn reference_before_last_cycle_still_snaps_backward() {
        let boundary = cycle_boundary(date("2025-08-30"), Some(date("2025-09-01")), 14);
        assert!(boundary.current <= date("2025-08-30"));
        assert_eq!(boundary.current, date("2025-08-18"));
    }

    #[test]
    fn parse_date_rejects_wrong_format() {
        let err = parse_date("15/09/2025", "%Y-%m-%d").unwrap_err();
        assert!(matches!(err, ClockError::InvalidDate { .. }));
    }

    #[test]
    fn branch_name_applies_prefix() {
        assert_eq!(
            branch_name("release/", date("2025-09-15"), "%Y-%m-%d"),
            "release/2025-09-15"
        );
        assert_eq!(branch_name("", date("2025-09-15"), "%Y-%m-%d"), "2025-09-15");
    }
}
