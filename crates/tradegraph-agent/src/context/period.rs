//! Report period normalization.
//!
//! Reports are keyed by hour. Any accepted timestamp format is truncated to
//! `YYYYMMDDTHH`, so two periods inside the same hour address the same report.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

/// Canonical period format.
pub const FORMAT: &str = "%Y%m%dT%H";

const DATETIME_FORMATS: &[&str] = &[
    "%Y%m%dT%H%M%S",
    "%Y%m%dT%H%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Normalize a period string to hour granularity.
///
/// Unrecognized input is returned trimmed but otherwise unchanged.
pub fn normalize(period: &str) -> String {
    let period = period.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(period) {
        return dt.naive_local().format(FORMAT).to_string();
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(period, fmt) {
            return dt.format(FORMAT).to_string();
        }
    }

    // Already canonical: chrono needs minutes to build a time, so pad them
    if let Ok(dt) = NaiveDateTime::parse_from_str(&format!("{period}00"), "%Y%m%dT%H%M") {
        return dt.format(FORMAT).to_string();
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(period, fmt) {
            return date.format("%Y%m%dT00").to_string();
        }
    }

    period.to_string()
}

/// The current local hour as a period.
pub fn now() -> String {
    Local::now().format(FORMAT).to_string()
}
