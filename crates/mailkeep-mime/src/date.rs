//! Lenient RFC 2822 date parsing.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Zone-less layouts seen in the wild, tried after RFC 2822 and RFC 3339.
/// They are interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses a `Date:` header value and normalizes it to UTC.
///
/// Comments such as `(UTC)` are ignored, the weekday is optional and a
/// trailing zone name after a numeric offset is tolerated.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = strip_comments(value);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    // "+0000 UTC" and similar
    if let Some((head, _)) = cleaned.rsplit_once(' ')
        && let Ok(dt) = DateTime::parse_from_rfc2822(head.trim())
    {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    let without_weekday = cleaned
        .split_once(',')
        .map_or(cleaned, |(_, rest)| rest.trim());
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(without_weekday, fmt)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

/// Removes parenthesized comments, including nested ones.
fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    for ch in value.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_rfc2822_with_offset() {
        let dt = parse_date("Tue, 15 Nov 1994 08:12:31 +0100").unwrap();
        assert_eq!(dt.to_rfc3339(), "1994-11-15T07:12:31+00:00");
    }

    #[test]
    fn test_missing_weekday_and_gmt() {
        let dt = parse_date("15 Nov 1994 08:12:31 GMT").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (1994, 11, 15));
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn test_trailing_comment_and_zone_name() {
        assert!(parse_date("Mon, 4 Mar 2024 09:30:00 +0000 (UTC)").is_some());
        assert!(parse_date("Mon, 4 Mar 2024 09:30:00 +0000 UTC").is_some());
    }

    #[test]
    fn test_zoneless_date_is_utc() {
        let dt = parse_date("Mon, 4 Mar 2024 09:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-04T09:30:00+00:00");
    }

    #[test]
    fn test_rfc3339() {
        assert!(parse_date("2024-03-04T09:30:00Z").is_some());
    }

    #[test]
    fn test_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("(only a comment)").is_none());
    }
}
