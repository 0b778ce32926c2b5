//! Timestamp parsing
//!
//! Unparseable input is `None`. Sources that print local time without a zone
//! are corrected with a fixed `tz_offset` in seconds east of UTC
//! (`32400` for JST): the offset is subtracted from the naive reading.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

static ISO_ZONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Z|\s?([+-])(\d{2}):?(\d{2}))$").expect("valid regex")
});
static FRACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}:\d{2}:\d{2})\.\d+").expect("valid regex"));
static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s*").expect("valid regex")
});
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("valid regex"));
static MERIDIEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)\s*([ap])\.?m\.?").expect("valid regex"));
static LOOSE_ZONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d{1,2}:\d{2}(?::\d{2})?(?:\.\d+)?(?:\s*[AP]M)?)\s*(?:Z|UTC|GMT)?\s*(?:([+-])(\d{2}):?(\d{2}))?$",
    )
    .expect("valid regex")
});
static COMPACT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("valid regex"));

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d %I:%M %p",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M %p",
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %H:%M",
    "%B %d %Y %I:%M %p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%d %B %Y %I:%M %p",
    "%b %d %H:%M:%S %Y",
    "%Y年%m月%d日 %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%B %d %Y",
    "%d %B %Y",
    "%Y年%m月%d日",
];

/// ISO-8601 date and time to unix seconds
pub fn parse_iso8601(input: &str, delimiter: char, tz_offset: i64) -> Option<i64> {
    let s = input.trim();
    let (rest, offset) = match ISO_ZONE_RE.captures(s) {
        Some(caps) => {
            let whole = caps.get(0)?;
            (&s[..whole.start()], Some(zone_seconds(&caps, 1)))
        }
        None => (s, None),
    };
    let rest = FRACTION_RE.replace(rest, "$1");

    let naive = [
        format!("%Y-%m-%d{delimiter}%H:%M:%S"),
        format!("%Y-%m-%d{delimiter}%H:%M"),
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(&rest, fmt).ok())?;

    naive
        .and_utc()
        .timestamp()
        .checked_sub(offset.unwrap_or(tz_offset))
}

/// Loose natural formats to unix seconds
pub fn unified_timestamp(input: &str, tz_offset: i64) -> Option<i64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(dt) = parse_with_zone(s) {
        return Some(dt.timestamp());
    }
    let (naive, offset) = parse_loose(s)?;
    naive
        .and_utc()
        .timestamp()
        .checked_sub(offset.unwrap_or(tz_offset))
}

/// Same parser, reported as the `YYYYMMDD` date as written
pub fn unified_strdate(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let date = match parse_with_zone(s) {
        Some(dt) => dt.date_naive(),
        None => parse_loose(s)?.0.date(),
    };
    Some(date.format("%Y%m%d").to_string())
}

fn parse_with_zone(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
}

/// Naive reading plus the explicit zone offset, if the text carried one
fn parse_loose(input: &str) -> Option<(NaiveDateTime, Option<i64>)> {
    let s = WEEKDAY_RE.replace(input, "");
    let s = ORDINAL_RE.replace_all(&s, "$1");
    let s = MERIDIEM_RE.replace_all(&s, |caps: &regex::Captures<'_>| {
        format!("{} {}M", &caps[1], caps[2].to_uppercase())
    });
    let s = s.replace(',', " ");
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");

    let (rest, offset) = match LOOSE_ZONE_RE.captures(&s) {
        Some(caps) => {
            let time = caps.get(1)?;
            let zone = s[time.end()..].trim();
            let offset = (!zone.is_empty()).then(|| zone_seconds(&caps, 2));
            (s[..time.end()].to_string(), offset)
        }
        None => (s.clone(), None),
    };
    let rest = FRACTION_RE.replace(&rest, "$1");

    if let Some(naive) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&rest, fmt).ok())
    {
        return Some((naive, offset));
    }

    let date = match COMPACT_DATE_RE.captures(&rest) {
        Some(caps) => NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        ),
        None => DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&rest, fmt).ok()),
    }?;
    Some((date.and_hms_opt(0, 0, 0)?, offset))
}

/// Signed zone offset from `sign, hours, minutes` captures starting at `first`;
/// a bare `Z`/`UTC`/`GMT` is zero.
fn zone_seconds(caps: &regex::Captures<'_>, first: usize) -> i64 {
    let Some(sign) = caps.get(first) else {
        return 0;
    };
    let field = |i: usize| -> i64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let seconds = field(first + 1) * 3600 + field(first + 2) * 60;
    if sign.as_str() == "-" {
        -seconds
    } else {
        seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-01-02T10:00:00Z
    const TEN_AM: i64 = 1_672_653_600;
    // 2023-01-02T00:00:00Z
    const MIDNIGHT: i64 = 1_672_617_600;

    #[test]
    fn test_parse_iso8601() {
        assert_eq!(parse_iso8601("2023-01-02T10:00:00Z", 'T', 0), Some(TEN_AM));
        assert_eq!(parse_iso8601("2023-01-02T19:00:00+09:00", 'T', 0), Some(TEN_AM));
        assert_eq!(parse_iso8601("2023-01-02T05:00:00-0500", 'T', 0), Some(TEN_AM));
        assert_eq!(parse_iso8601("2023-01-02T10:00:00.250Z", 'T', 0), Some(TEN_AM));
        assert_eq!(parse_iso8601("2023-01-02 10:00:00", ' ', 0), Some(TEN_AM));
        assert_eq!(parse_iso8601("yesterday", 'T', 0), None);
    }

    #[test]
    fn test_zoneless_local_time_is_corrected() {
        assert_eq!(parse_iso8601("2023-01-02T19:00:00", 'T', 32400), Some(TEN_AM));
        assert_eq!(unified_timestamp("2023/01/02 19:00", 32400), Some(TEN_AM));
        // An explicit zone wins over the configured offset
        assert_eq!(unified_timestamp("2023/01/02 10:00 UTC", 32400), Some(TEN_AM));
    }

    #[test]
    fn test_out_of_range_offset_is_absent() {
        assert_eq!(parse_iso8601("2023-01-02T10:00:00", 'T', i64::MIN), None);
        assert_eq!(unified_timestamp("2023/01/02 10:00", i64::MIN), None);
        assert_eq!(parse_iso8601("2023-01-02T10:00:00Z", 'T', i64::MIN), Some(TEN_AM));
    }

    #[test]
    fn test_unified_timestamp_formats() {
        assert_eq!(unified_timestamp("2023/01/02 10:00", 0), Some(TEN_AM));
        assert_eq!(unified_timestamp("Mon, 02 Jan 2023 10:00:00 +0000", 0), Some(TEN_AM));
        assert_eq!(unified_timestamp("2023-01-02T10:00:00Z", 0), Some(TEN_AM));
        assert_eq!(unified_timestamp("January 2, 2023", 0), Some(MIDNIGHT));
        assert_eq!(unified_timestamp("2nd January 2023", 0), Some(MIDNIGHT));
        assert_eq!(unified_timestamp("02.01.2023", 0), Some(MIDNIGHT));
        assert_eq!(unified_timestamp("20230102", 0), Some(MIDNIGHT));
        assert_eq!(unified_timestamp("2023年1月2日", 0), Some(MIDNIGHT));
        assert_eq!(unified_timestamp("2023-01-02 10:00 pm", 0), Some(TEN_AM + 12 * 3600));
        assert_eq!(unified_timestamp("2023-01-02 15:00 +05:00", 0), Some(TEN_AM));
        assert_eq!(unified_timestamp("", 0), None);
        assert_eq!(unified_timestamp("not a date", 0), None);
    }

    #[test]
    fn test_unified_strdate() {
        assert_eq!(unified_strdate("January 2, 2023"), Some("20230102".to_string()));
        assert_eq!(unified_strdate("2023-01-02T23:30:00+09:00"), Some("20230102".to_string()));
        assert_eq!(unified_strdate("garbage"), None);
    }
}
