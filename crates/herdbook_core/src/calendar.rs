//! Calendar-day arithmetic for reproductive scheduling.
//!
//! # Responsibility
//! - Parse stored ISO dates into `NaiveDate` values.
//! - Provide day differences, inclusive range checks and day offsets.
//!
//! # Invariants
//! - All arithmetic is timezone-naive with calendar-day granularity.
//! - Malformed input is a hard `DateError`, never a sentinel date.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage/wire format for every date handled by the engine.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Offset-free timestamp layouts some writers persist; fractions are optional.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Date parsing and arithmetic failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    /// Input text is not a valid `YYYY-MM-DD` calendar date.
    Unparseable(String),
    /// Offset arithmetic left chrono's supported date range.
    OutOfRange { date: NaiveDate, days: i64 },
}

impl Display for DateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparseable(value) => write!(f, "unparseable date `{value}`"),
            Self::OutOfRange { date, days } => {
                write!(f, "adding {days} days to {date} leaves the supported range")
            }
        }
    }
}

impl Error for DateError {}

/// Parses one stored date. Surrounding whitespace is ignored.
///
/// Besides a bare `YYYY-MM-DD`, a complete timestamp (`2024-01-01 08:30:00`,
/// `2024-01-01T08:30:00Z`) is accepted and its calendar day kept. Anything
/// else, including a date followed by stray text, is rejected.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateError> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(stamp.date_naive());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|stamp| stamp.date())
        .ok_or_else(|| DateError::Unparseable(trimmed.to_string()))
}

/// Formats a date in the storage format.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Returns `a - b` in whole days. Negative when `a` is earlier than `b`.
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    a.signed_duration_since(b).num_days()
}

/// Returns whether `date` lies in `[start, end]`, both ends inclusive.
pub fn is_within(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    start <= date && date <= end
}

/// Returns `date` shifted by `n` days (`n` may be negative).
pub fn add_days(date: NaiveDate, n: i64) -> Result<NaiveDate, DateError> {
    let shifted = if n >= 0 {
        date.checked_add_days(Days::new(n.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(n.unsigned_abs()))
    };
    shifted.ok_or(DateError::OutOfRange { date, days: n })
}

#[cfg(test)]
mod tests {
    use super::{add_days, days_between, format_date, is_within, parse_date, DateError};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_accepts_iso_dates_and_timestamps() {
        assert_eq!(parse_date("2024-01-01").unwrap(), date(2024, 1, 1));
        assert_eq!(parse_date(" 2024-02-29 ").unwrap(), date(2024, 2, 29));
        assert_eq!(parse_date("2024-03-05 08:30:00").unwrap(), date(2024, 3, 5));
        assert_eq!(parse_date("2024-03-05T08:30:00Z").unwrap(), date(2024, 3, 5));
        assert_eq!(parse_date("2024-03-05T08:30:00").unwrap(), date(2024, 3, 5));
        assert_eq!(
            parse_date("2024-03-05T23:30:00.250-05:00").unwrap(),
            date(2024, 3, 5)
        );
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for raw in [
            "",
            "not-a-date",
            "2023-02-29",
            "01/02/2024",
            "2024-13-01",
            "2024-01-01 banana",
            "2024-01-01T",
            "2024-01-01 08:30:00 extra",
            "2024-01-01T25:00:00",
            "2024-01-01x",
        ] {
            let err = parse_date(raw).unwrap_err();
            assert!(matches!(err, DateError::Unparseable(_)), "{raw} should fail");
        }
    }

    #[test]
    fn days_between_is_signed() {
        assert_eq!(days_between(date(2024, 1, 11), date(2024, 1, 1)), 10);
        assert_eq!(days_between(date(2024, 1, 1), date(2024, 1, 11)), -10);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 2, 28)), 2);
    }

    #[test]
    fn is_within_is_inclusive_on_both_ends() {
        let start = date(2024, 5, 1);
        let end = date(2024, 5, 8);
        assert!(is_within(start, start, end));
        assert!(is_within(end, start, end));
        assert!(!is_within(date(2024, 4, 30), start, end));
        assert!(!is_within(date(2024, 5, 9), start, end));
    }

    #[test]
    fn add_days_moves_both_directions() {
        assert_eq!(add_days(date(2024, 1, 1), 55).unwrap(), date(2024, 2, 25));
        assert_eq!(add_days(date(2024, 1, 1), -1).unwrap(), date(2023, 12, 31));
        assert_eq!(format_date(add_days(date(2024, 1, 1), 0).unwrap()), "2024-01-01");
    }

    #[test]
    fn add_days_reports_overflow() {
        let err = add_days(NaiveDate::MAX, 1).unwrap_err();
        assert!(matches!(err, DateError::OutOfRange { days: 1, .. }));
    }
}
