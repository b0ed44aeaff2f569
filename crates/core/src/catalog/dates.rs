//! Timestamp encodings used by the catalog.
//!
//! File dates are REAL seconds since 2001-01-01T00:00:00Z. Capture times are
//! ISO-8601 strings in the camera's local time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Unix timestamp of 2001-01-01T00:00:00Z.
pub const CATALOG_EPOCH_UNIX: i64 = 978_307_200;

/// Decode catalog epoch seconds. Missing or unrepresentable values map to
/// `DateTime::<Utc>::MIN_UTC`.
pub fn decode_catalog_seconds(seconds: Option<f64>) -> DateTime<Utc> {
    let Some(seconds) = seconds.filter(|s| s.is_finite()) else {
        return DateTime::<Utc>::MIN_UTC;
    };

    let micros = (seconds * 1_000_000.0).round();
    if micros.abs() > i64::MAX as f64 / 2.0 {
        return DateTime::<Utc>::MIN_UTC;
    }
    let micros = micros as i64;

    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;

    CATALOG_EPOCH_UNIX
        .checked_add(secs)
        .and_then(|unix| DateTime::from_timestamp(unix, nanos))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Inverse of [`decode_catalog_seconds`], at microsecond precision.
pub fn encode_catalog_seconds(at: DateTime<Utc>) -> f64 {
    let micros = at.timestamp_micros() - CATALOG_EPOCH_UNIX * 1_000_000;
    micros as f64 / 1_000_000.0
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a capture time. An explicit offset is dropped; the wall-clock time
/// as written is kept.
pub fn parse_capture_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_local());
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
