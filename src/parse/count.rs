//! Abbreviated count parsing ("1.2K", "3M", "12,345 views").

use regex::Regex;
use std::sync::LazyLock;

static COUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\.(\d+))?([KMB])?").unwrap());

/// Parse the first number in `text`, honouring a K/M/B suffix.
///
/// Thousands separators are ignored and fractional parts are truncated after
/// scaling. The arithmetic is done on the decimal digits directly, so
/// "1.2K" is exactly 1200. Anything unparseable yields 0.
pub fn parse_count(text: &str) -> u64 {
    let cleaned = text.to_uppercase().replace(',', "");

    let Some(caps) = COUNT_PATTERN.captures(&cleaned) else {
        return 0;
    };

    let scale: u32 = match caps.get(3).map(|m| m.as_str()) {
        Some("K") => 3,
        Some("M") => 6,
        Some("B") => 9,
        _ => 0,
    };

    let whole = digits_value(&caps[1]);
    let mut value = whole.saturating_mul(10u64.pow(scale));

    if let Some(frac) = caps.get(2) {
        // Keep only as many fractional digits as the suffix can absorb.
        let kept: String = frac.as_str().chars().take(scale as usize).collect();
        if !kept.is_empty() {
            let pad = scale - kept.len() as u32;
            value = value.saturating_add(digits_value(&kept).saturating_mul(10u64.pow(pad)));
        }
    }

    value
}

fn digits_value(digits: &str) -> u64 {
    digits.bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_suffixed() {
        assert_eq!(parse_count("1.2K"), 1200);
        assert_eq!(parse_count("3M"), 3_000_000);
        assert_eq!(parse_count("2.5B"), 2_500_000_000);
        assert_eq!(parse_count("47"), 47);
        assert_eq!(parse_count("1.25k"), 1250);
    }

    #[test]
    fn separators_and_surrounding_text() {
        assert_eq!(parse_count("12,345 views"), 12_345);
        assert_eq!(parse_count("All reactions: 1,024"), 1024);
        assert_eq!(parse_count("8 comments"), 8);
    }

    #[test]
    fn truncates_excess_precision() {
        assert_eq!(parse_count("1.2345K"), 1234);
        assert_eq!(parse_count("7.9"), 7);
    }

    #[test]
    fn degrades_to_zero() {
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("no numbers here"), 0);
        assert_eq!(parse_count("K"), 0);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(parse_count("99999999999999999999999B"), u64::MAX);
    }
}
