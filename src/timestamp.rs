//! Timestamp specifier resolution.
//!
//! A specifier is one of:
//!
//! - a unixtime in seconds (`1700000000`)
//! - an ISO 8601 date or date-time, extended (`2023-01`, `2023-01-01`,
//!   `2023-01-01T09:00:00`, `2023-01-01T00:00:00Z`, `2023-01-01T09:00:00+09:00`)
//!   or basic (`20230101T090000`, `20230101T0900Z`); values without an offset
//!   are read in the local timezone. A bare `20230101` is a unixtime.
//! - a duration (`1d`, `1h30m`, `90s`), meaning "that long before now"

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

/// Resolve a timestamp specifier to unixtime seconds, relative to `now`.
pub fn resolve_timestamp(spec: &str, now: u64) -> Result<u64, String> {
    let invalid = || format!("invalid timestamp specifier: {spec}");

    // a bare integer never falls through to the other grammars
    if !spec.is_empty() && spec.bytes().all(|b| b.is_ascii_digit()) {
        return spec.parse().map_err(|_| invalid());
    }
    if let Some(ts) = parse_iso8601(spec) {
        return u64::try_from(ts).map_err(|_| invalid());
    }
    if let Some(millis) = parse_duration_millis(spec) {
        if millis > 0.0 {
            let secs = (millis / 1000.0).floor() as u64;
            return now.checked_sub(secs).ok_or_else(invalid);
        }
    }
    Err(invalid())
}

fn parse_iso8601(s: &str) -> Option<i64> {
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.timestamp());
        }
    }
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| year_month(s))
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// `YYYY-MM`, meaning the first day of that month.
fn year_month(s: &str) -> Option<NaiveDate> {
    if s.len() != 7 {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok()
}

/// Parse a sequence of `<magnitude><unit>` tokens into milliseconds.
///
/// Supported units are `d`, `h`, `m`, `s` and `ms`; anything else (years,
/// weeks, stray characters) rejects the whole string.
fn parse_duration_millis(s: &str) -> Option<f64> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return None;
    }
    let mut total = 0.0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let magnitude: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit_millis = match &rest[..unit_len] {
            "d" => 86_400_000.0,
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            _ => return None,
        };
        total += magnitude * unit_millis;
        rest = rest[unit_len..].trim_start();
    }
    Some(total)
}
