//! Month buckets
//!
//! Every cashback read and write is keyed by the first day of a calendar month.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::{Error, Result};

/// Normalize any date to the first day of its month
pub fn normalize(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// The month bucket containing `now`
pub fn current(now: DateTime<Utc>) -> NaiveDate {
    normalize(now.date_naive())
}

/// First day of the month after `month`
pub fn next(month: NaiveDate) -> NaiveDate {
    let month = normalize(month);
    let (year, m) = if month.month() == 12 {
        (month.year() + 1, 1)
    } else {
        (month.year(), month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, m, 1).unwrap_or(month)
}

/// Half-open UTC interval `[start, end)` covered by the month
pub fn bounds(month: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = normalize(month);
    let end = next(start);
    (
        start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        end.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
    )
}

/// Parse `YYYY-MM` or `YYYY-MM-DD` into a month bucket
pub fn parse(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d"))
        .map(normalize)
        .map_err(|_| Error::InvalidData(format!("Invalid month '{}' (use YYYY-MM)", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(d(2024, 3, 17)), d(2024, 3, 1));
        assert_eq!(normalize(d(2024, 3, 1)), d(2024, 3, 1));
    }

    #[test]
    fn test_next_wraps_year() {
        assert_eq!(next(d(2024, 12, 9)), d(2025, 1, 1));
        assert_eq!(next(d(2024, 2, 29)), d(2024, 3, 1));
    }

    #[test]
    fn test_bounds() {
        let (start, end) = bounds(d(2024, 3, 20));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse("2024-03").unwrap(), d(2024, 3, 1));
        assert_eq!(parse("2024-03-15").unwrap(), d(2024, 3, 1));
        assert!(parse("March").is_err());
    }

    #[test]
    fn test_current() {
        let now = Utc.with_ymd_and_hms(2024, 7, 31, 23, 59, 59).unwrap();
        assert_eq!(current(now), d(2024, 7, 1));
    }
}
