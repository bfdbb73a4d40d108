use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{Error, Result};

/// Canonical storage format for day keys.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Truncate a date to the first day of its month.
pub fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// First day of the month before `d`'s month.
pub fn previous_month(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 1 {
        (d.year() - 1, 12)
    } else {
        (d.year(), d.month() - 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap()
}

/// Format a date as `YYYY-MM-DD`.
pub fn date_key(d: NaiveDate) -> String {
    d.format(DATE_KEY_FORMAT).to_string()
}

/// Format a date's month as `YYYY-MM`.
pub fn month_key(d: NaiveDate) -> String {
    format!("{}-{:02}", d.year(), d.month())
}

/// Parse a `YYYY-MM-DD` day key.
pub fn parse_date_key(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_KEY_FORMAT)
        .map_err(|_| Error::InvalidInput(format!("expected YYYY-MM-DD, got '{s}'")))
}

/// Parse a `YYYY-MM` month key into the first day of that month.
pub fn parse_month_key(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(&format!("{s}-01"), DATE_KEY_FORMAT)
        .map_err(|_| Error::InvalidInput(format!("expected YYYY-MM, got '{s}'")))
}
