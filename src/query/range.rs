use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::date_util::{date_key, last_day_of_month};
use crate::error::{Error, Result};

static RE_PRESET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)[dD]$").unwrap());
static RE_CUSTOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\s*\.\.\s*(\d{4}-\d{2}-\d{2})$").unwrap()
});
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// Fixed lookback windows offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Preset {
    Last7,
    Last30,
    Last90,
}

impl Preset {
    pub fn days(self) -> u32 {
        match self {
            Preset::Last7 => 7,
            Preset::Last30 => 30,
            Preset::Last90 => 90,
        }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        match days {
            7 => Some(Preset::Last7),
            30 => Some(Preset::Last30),
            90 => Some(Preset::Last90),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeMode {
    Preset(Preset),
    Custom,
}

/// An inclusive calendar-day range.
///
/// `start <= end` is expected but not enforced. An inverted range simply
/// contains no dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub mode: RangeMode,
}

impl DateRange {
    /// Preset window ending yesterday relative to `today`.
    ///
    /// The current partial day is never reported, so a 7-day preset on
    /// 2025-09-10 covers 2025-09-03 through 2025-09-09.
    pub fn preset(preset: Preset, today: NaiveDate) -> Self {
        let end = today - Duration::days(1);
        let start = end - Duration::days(preset.days() as i64 - 1);
        Self {
            start,
            end,
            mode: RangeMode::Preset(preset),
        }
    }

    /// Preset window relative to the local clock.
    pub fn preset_as_of_today(preset: Preset) -> Self {
        Self::preset(preset, chrono::Local::now().date_naive())
    }

    /// A user-supplied range. No validation is performed.
    pub fn custom(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            mode: RangeMode::Custom,
        }
    }

    /// Parse a range string.
    ///
    /// Supported formats:
    /// - `7d`, `30d`, `90d`: preset lookback ending yesterday
    /// - `2025-09-01..2025-09-30`: custom inclusive range
    /// - `2025-09`: custom range covering the calendar month
    pub fn parse(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        if let Some(caps) = RE_PRESET.captures(s) {
            let days: u32 = caps[1]
                .parse()
                .map_err(|_| Error::RangeParse(format!("invalid day count: {s}")))?;
            return Preset::from_days(days)
                .map(|p| Self::preset(p, today))
                .ok_or_else(|| {
                    Error::RangeParse(format!("unsupported preset {days}d (use 7d, 30d or 90d)"))
                });
        }

        if let Some(caps) = RE_CUSTOM.captures(s) {
            let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
                .map_err(|_| Error::RangeParse(format!("invalid start date: {}", &caps[1])))?;
            let end = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d")
                .map_err(|_| Error::RangeParse(format!("invalid end date: {}", &caps[2])))?;
            return Ok(Self::custom(start, end));
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u32 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                let start = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
                return Ok(Self::custom(start, last_day_of_month(year, month)));
            }
        }

        Err(Error::RangeParse(format!("unrecognized range: {s}")))
    }

    /// Membership test on typed dates.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, never less than 1.
    pub fn days(&self) -> i64 {
        days_in_range(self.start, self.end)
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn start_key(&self) -> String {
        date_key(self.start)
    }

    pub fn end_key(&self) -> String {
        date_key(self.end)
    }

    /// Canonical label for display and config storage.
    pub fn to_key(&self) -> String {
        match self.mode {
            RangeMode::Preset(p) => format!("{}d", p.days()),
            RangeMode::Custom => format!("{}..{}", self.start_key(), self.end_key()),
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// Inclusive membership test on canonical `YYYY-MM-DD` keys.
///
/// Zero-padded ISO dates sort lexicographically in calendar order.
pub fn in_range(date_key: &str, range: &DateRange) -> bool {
    let start = range.start_key();
    let end = range.end_key();
    start.as_str() <= date_key && date_key <= end.as_str()
}

/// Inclusive day count between two dates, floored at 1 so per-day goal math
/// never divides by zero.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> i64 {
    ((end - start).num_days() + 1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_preset_covers_exact_days_ending_yesterday() {
        let today = d(2025, 9, 10);
        for preset in [Preset::Last7, Preset::Last30, Preset::Last90] {
            let r = DateRange::preset(preset, today);
            assert_eq!(r.end, d(2025, 9, 9));
            assert_eq!(r.days(), preset.days() as i64);
            assert_eq!(r.mode, RangeMode::Preset(preset));
            assert!(!r.contains(today));
        }
    }

    #[test]
    fn test_preset_crosses_year_boundary() {
        let r = DateRange::preset(Preset::Last7, d(2026, 1, 3));
        assert_eq!(r.start, d(2025, 12, 27));
        assert_eq!(r.end, d(2026, 1, 2));
    }

    #[test]
    fn test_in_range_inclusive_boundaries() {
        let r = DateRange::custom(d(2025, 9, 1), d(2025, 9, 30));
        assert!(in_range("2025-09-01", &r));
        assert!(in_range("2025-09-30", &r));
        assert!(in_range("2025-09-15", &r));
        assert!(!in_range("2025-08-31", &r));
        assert!(!in_range("2025-10-01", &r));
    }

    #[test]
    fn test_in_range_agrees_with_contains() {
        let r = DateRange::preset(Preset::Last30, d(2025, 3, 2));
        let mut day = r.start - Duration::days(3);
        while day <= r.end + Duration::days(3) {
            assert_eq!(in_range(&date_key(day), &r), r.contains(day), "{day}");
            day += Duration::days(1);
        }
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let r = DateRange::custom(d(2025, 9, 30), d(2025, 9, 1));
        assert!(r.is_inverted());
        assert!(!r.contains(d(2025, 9, 15)));
        assert!(!in_range("2025-09-30", &r));
        assert!(!in_range("2025-09-01", &r));
        assert_eq!(r.days(), 1);
    }

    #[test]
    fn test_days_in_range() {
        assert_eq!(days_in_range(d(2025, 9, 1), d(2025, 9, 1)), 1);
        assert_eq!(days_in_range(d(2025, 9, 1), d(2025, 9, 30)), 30);
        assert_eq!(days_in_range(d(2024, 2, 1), d(2024, 2, 29)), 29);
        assert_eq!(days_in_range(d(2025, 9, 30), d(2025, 9, 1)), 1);
    }

    #[test]
    fn test_parse_presets() {
        let today = d(2025, 9, 10);
        assert_eq!(
            DateRange::parse("7d", today).unwrap(),
            DateRange::preset(Preset::Last7, today)
        );
        assert_eq!(
            DateRange::parse("90D", today).unwrap(),
            DateRange::preset(Preset::Last90, today)
        );
        assert!(DateRange::parse("14d", today).is_err());
    }

    #[test]
    fn test_parse_custom_and_month() {
        let today = d(2025, 9, 10);
        let r = DateRange::parse("2025-08-01..2025-08-15", today).unwrap();
        assert_eq!(r, DateRange::custom(d(2025, 8, 1), d(2025, 8, 15)));

        let r = DateRange::parse("2024-02", today).unwrap();
        assert_eq!(r, DateRange::custom(d(2024, 2, 1), d(2024, 2, 29)));
    }

    #[test]
    fn test_parse_invalid() {
        let today = d(2025, 9, 10);
        assert!(DateRange::parse("garbage", today).is_err());
        assert!(DateRange::parse("2025-13", today).is_err());
        assert!(DateRange::parse("2025-02-30..2025-03-01", today).is_err());
    }

    #[test]
    fn test_to_key() {
        let today = d(2025, 9, 10);
        assert_eq!(DateRange::preset(Preset::Last30, today).to_key(), "30d");
        assert_eq!(
            DateRange::custom(d(2025, 8, 1), d(2025, 8, 15)).to_key(),
            "2025-08-01..2025-08-15"
        );
    }
}
