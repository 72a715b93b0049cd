//! Relative and explicit date normalization.
//!
//! Platforms display post dates as "2h", "Yesterday at 9:14 PM" or
//! "July 3 at 10:00 AM". Everything is normalized to [`CANONICAL_FORMAT`] in
//! local time so dates sort and compare as strings.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

/// Canonical timestamp format for stored post dates.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Years before this are treated as a parser default, not a real date.
const MIN_PLAUSIBLE_YEAR: i32 = 1971;

/// Relative offsets, minutes first: "2m" is read as two minutes.
static RELATIVE_PATTERNS: LazyLock<Vec<(Regex, i64)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"^(\d+)\s*(?:minutes?|mins?|m)(?:\s+ago)?$").unwrap(),
            60,
        ),
        (
            Regex::new(r"^(\d+)\s*(?:hours?|hrs?|h)(?:\s+ago)?$").unwrap(),
            3_600,
        ),
        (
            Regex::new(r"^(\d+)\s*(?:days?|d)(?:\s+ago)?$").unwrap(),
            86_400,
        ),
        (
            Regex::new(r"^(\d+)\s*(?:weeks?|wks?|w)(?:\s+ago)?$").unwrap(),
            7 * 86_400,
        ),
    ]
});

static YEARS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*(?:years?|yrs?|y)(?:\s+ago)?$").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Explicit formats carrying a time of day. Commas are stripped before
/// matching, so "July 3, 2025" is tried as "July 3 2025".
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%B %d %Y at %I:%M %p",
    "%B %d %Y at %H:%M",
    "%B %d %Y %I:%M %p",
    "%B %d %Y %H:%M",
    "%d %B %Y at %I:%M %p",
    "%d %B %Y at %H:%M",
    "%d %B %Y %H:%M",
    "%A %B %d %Y at %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Explicit date-only formats; the time becomes midnight.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d %Y",
    "%d %B %Y",
    "%A %B %d %Y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
];

/// Year-less formats; the current year is appended before parsing.
const YEARLESS_DATETIME_FORMATS: &[&str] = &[
    "%B %d at %I:%M %p",
    "%B %d at %H:%M",
    "%d %B at %I:%M %p",
    "%d %B at %H:%M",
];

const YEARLESS_DATE_FORMATS: &[&str] = &["%B %d", "%d %B"];

/// Normalize a platform date string relative to `now`.
///
/// Returns the canonical timestamp, or `raw` unchanged when no rule matches.
pub fn normalize_date(raw: &str, now: NaiveDateTime) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return raw.to_string();
    }

    if parse_canonical(trimmed).is_some() {
        return trimmed.to_string();
    }

    let lower = WHITESPACE
        .replace_all(&trimmed.to_lowercase(), " ")
        .into_owned();

    if lower.contains("just now") || lower == "now" || lower.starts_with("today") {
        return format_canonical(now);
    }
    if lower.starts_with("yesterday") {
        return format_canonical(now - Duration::days(1));
    }

    for (pattern, unit_secs) in RELATIVE_PATTERNS.iter() {
        if let Some(n) = leading_number(pattern, &lower) {
            return format_canonical(now - Duration::seconds(n.saturating_mul(*unit_secs)));
        }
    }

    if let Some(n) = leading_number(&YEARS_PATTERN, &lower) {
        return format_canonical(now - Duration::days(n.saturating_mul(365)));
    }

    match parse_explicit(trimmed, now.year()) {
        Some(parsed) => format_canonical(parsed),
        None => raw.to_string(),
    }
}

/// Parse a canonical timestamp string.
pub fn parse_canonical(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), CANONICAL_FORMAT).ok()
}

pub fn format_canonical(dt: NaiveDateTime) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// Convert an embedded epoch value to a canonical local timestamp.
///
/// Values above 10^12 are taken as milliseconds, others as seconds.
pub fn from_epoch(value: i64) -> Option<String> {
    if value <= 0 {
        return None;
    }
    let secs = if value > 1_000_000_000_000 {
        value / 1000
    } else {
        value
    };
    let utc = DateTime::from_timestamp(secs, 0)?;
    Some(format_canonical(utc.with_timezone(&Local).naive_local()))
}

fn leading_number(pattern: &Regex, s: &str) -> Option<i64> {
    // Bounded so the offset arithmetic below stays within chrono's range.
    pattern
        .captures(s)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .filter(|n| *n < 100_000)
}

fn parse_explicit(raw: &str, current_year: i32) -> Option<NaiveDateTime> {
    let cleaned = WHITESPACE
        .replace_all(&raw.replace(',', " "), " ")
        .trim()
        .to_string();

    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&cleaned, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| {
            let with_year = format!("{} {}", cleaned, current_year);
            YEARLESS_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| {
                    NaiveDateTime::parse_from_str(&with_year, &format!("{} %Y", fmt)).ok()
                })
                .or_else(|| {
                    YEARLESS_DATE_FORMATS
                        .iter()
                        .find_map(|fmt| {
                            NaiveDate::parse_from_str(&with_year, &format!("{} %Y", fmt)).ok()
                        })
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        })?;

    if parsed.year() < MIN_PLAUSIBLE_YEAR {
        return parsed.with_year(current_year);
    }
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 10)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    #[test]
    fn canonical_passes_through() {
        assert_eq!(
            normalize_date("2025-07-03 10:00:00", now()),
            "2025-07-03 10:00:00"
        );
    }

    #[test]
    fn unrecognized_is_returned_unchanged() {
        assert_eq!(normalize_date("Sometime soon", now()), "Sometime soon");
        assert_eq!(normalize_date("", now()), "");
    }

    #[test]
    fn today_and_yesterday() {
        assert_eq!(normalize_date("Just now", now()), "2025-07-10 12:30:00");
        assert_eq!(normalize_date("Today", now()), "2025-07-10 12:30:00");
        assert_eq!(normalize_date("Yesterday", now()), "2025-07-09 12:30:00");
        assert_eq!(
            normalize_date("Yesterday at 9:14 PM", now()),
            "2025-07-09 12:30:00"
        );
    }

    #[test]
    fn yesterday_against_wall_clock() {
        let now = Local::now().naive_local();
        let parsed = parse_canonical(&normalize_date("Yesterday", now)).unwrap();
        assert_eq!(parsed.date(), (now - Duration::days(1)).date());
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(normalize_date("5m", now()), "2025-07-10 12:25:00");
        assert_eq!(normalize_date("2 hours ago", now()), "2025-07-10 10:30:00");
        assert_eq!(normalize_date("3d", now()), "2025-07-07 12:30:00");
        assert_eq!(normalize_date("2w", now()), "2025-06-26 12:30:00");
        assert_eq!(normalize_date("1 wk", now()), "2025-07-03 12:30:00");
        assert_eq!(normalize_date("1y", now()), "2024-07-10 12:30:00");
    }

    #[test]
    fn two_m_is_minutes() {
        assert_eq!(normalize_date("2m", now()), "2025-07-10 12:28:00");
    }

    #[test]
    fn explicit_formats() {
        assert_eq!(
            normalize_date("July 3, 2025 at 10:00 AM", now()),
            "2025-07-03 10:00:00"
        );
        assert_eq!(normalize_date("3 July 2025", now()), "2025-07-03 00:00:00");
        assert_eq!(normalize_date("2025-07-03", now()), "2025-07-03 00:00:00");
        assert_eq!(normalize_date("07/03/2025", now()), "2025-07-03 00:00:00");
        assert_eq!(
            normalize_date("2025-07-03T08:15:00", now()),
            "2025-07-03 08:15:00"
        );
    }

    #[test]
    fn yearless_formats_take_current_year() {
        assert_eq!(
            normalize_date("July 3 at 10:00 AM", now()),
            "2025-07-03 10:00:00"
        );
        assert_eq!(normalize_date("3 July", now()), "2025-07-03 00:00:00");
    }

    #[test]
    fn implausible_years_are_replaced() {
        assert_eq!(normalize_date("1900-07-03", now()), "2025-07-03 00:00:00");
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let secs = from_epoch(1_751_536_800).unwrap();
        let millis = from_epoch(1_751_536_800_000).unwrap();
        assert_eq!(secs, millis);
        assert!(parse_canonical(&secs).is_some());
        assert!(from_epoch(0).is_none());
    }
}
