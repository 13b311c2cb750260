//! Timestamp conversion utilities.
//!
//! Post creation times travel through the engine as `i64` microseconds since
//! the Unix epoch. These helpers convert to and from ISO-8601 text at the
//! edges (fixtures, logs).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Microseconds per second
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Parse an ISO-8601 / RFC 3339 timestamp into microseconds since epoch.
///
/// Accepts an explicit offset (`2024-05-01T10:00:00+02:00`, `...Z`) or a naive
/// timestamp, which is taken as UTC. Returns `None` on malformed input.
#[must_use]
pub fn iso_to_micros(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_micros());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_micros())
}

/// Format microseconds since epoch as RFC 3339 UTC.
///
/// Values outside chrono's representable range clamp to its bounds instead of
/// panicking.
#[must_use]
pub fn micros_to_iso(micros: i64) -> String {
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let sub_micros = micros.rem_euclid(MICROS_PER_SECOND);
    let nsecs = u32::try_from(sub_micros * 1000).unwrap_or(0);
    Utc.timestamp_opt(secs, nsecs)
        .single()
        .unwrap_or(if micros < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(iso_to_micros("1970-01-01T00:00:01Z"), Some(1_000_000));
        assert_eq!(
            iso_to_micros("1970-01-01T01:00:00+01:00"),
            Some(0),
            "offset should be normalised to UTC"
        );
    }

    #[test]
    fn parses_naive_as_utc() {
        assert_eq!(iso_to_micros("1970-01-01T00:00:00.5"), Some(500_000));
        assert_eq!(iso_to_micros("1970-01-01 00:00:02"), Some(2_000_000));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(iso_to_micros("yesterday"), None);
        assert_eq!(iso_to_micros(""), None);
    }

    #[test]
    fn formats_and_reparses() {
        let micros = 1_714_557_600_123_456;
        let text = micros_to_iso(micros);
        assert!(text.ends_with('Z'));
        assert_eq!(iso_to_micros(&text), Some(micros));
    }

    #[test]
    fn extreme_values_do_not_panic() {
        let _ = micros_to_iso(i64::MAX);
        let _ = micros_to_iso(i64::MIN);
    }
}
