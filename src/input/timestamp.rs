//! Timestamp extraction for the supported log formats
//!
//! Formats are tried in a fixed order and the first one that parses wins.
//! Callers fall back to ingestion time when nothing matches; parsing itself
//! never fails loudly.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};

/// Naive formats interpreted as UTC, in priority order
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S"];

/// Apache/Nginx access log format, e.g. `10/Oct/2024:13:55:36 -0700`
const ACCESS_LOG_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Syslog timestamps carry no year; the current one is assumed
const SYSLOG_FORMAT: &str = "%Y %b %d %H:%M:%S";

/// ISO-8601 with a literal `Z` suffix
const ISO_ZULU_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// ISO-8601 without zone, as emitted by the capture script
const ISO_NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Parse a timestamp string using the current year for syslog stamps
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_timestamp_with_year(raw, Utc::now().year())
}

/// Parse a timestamp string, assuming `year` for formats that omit it
pub fn parse_timestamp_with_year(raw: &str, year: i32) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(dt) = DateTime::parse_from_str(raw, ACCESS_LOG_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }

    // Syslog pads single-digit days with an extra space ("Oct  5")
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let candidate = format!("{} {}", year, collapsed);
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, SYSLOG_FORMAT) {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, ISO_ZULU_FORMAT) {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ISO_NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    None
}

/// Parse a timestamp or fall back to `fallback` (normally ingestion time)
pub fn parse_or(raw: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or(fallback)
}
