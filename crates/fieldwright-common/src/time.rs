//! Timestamp and duration helpers.
//!
//! Upstream timestamps arrive as ISO-8601 text. An explicit offset suffix is
//! preserved (it drives local-day grouping); a timestamp without one is read
//! as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse an ISO-8601 timestamp, keeping its offset. Offset-less timestamps
/// and bare dates are placed at UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().with_timezone(&utc_offset()));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().with_timezone(&utc_offset()))
}

/// Interpret a number as milliseconds since the Unix epoch.
pub fn from_epoch_millis(ms: f64) -> Option<DateTime<FixedOffset>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(ms.round() as i64).map(|dt| dt.fixed_offset())
}

/// `+02:00` / `-05:30` style signature for an offset.
pub fn offset_signature(offset: &FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.unsigned_abs();
    format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
}

/// Parse an ISO-8601 duration (`PT1H30M`, `P1DT2H`, `PT0.5H`) into seconds.
/// Year and month designators are rejected since their length is calendar
/// dependent.
pub fn parse_iso_duration(s: &str) -> Option<f64> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let body = body.strip_prefix('P').or_else(|| body.strip_prefix('p'))?;
    if body.is_empty() {
        return None;
    }

    let mut total = 0.0;
    let mut in_time = false;
    let mut number = String::new();
    let mut saw_component = false;

    for ch in body.chars() {
        match ch.to_ascii_uppercase() {
            'T' => {
                if in_time || !number.is_empty() {
                    return None;
                }
                in_time = true;
            }
            c if c.is_ascii_digit() || c == '.' || c == ',' => {
                number.push(if c == ',' { '.' } else { c });
            }
            unit => {
                let amount: f64 = number.parse().ok()?;
                number.clear();
                let factor = match (in_time, unit) {
                    (false, 'W') => 7.0 * 86_400.0,
                    (false, 'D') => 86_400.0,
                    (true, 'H') => 3_600.0,
                    (true, 'M') => 60.0,
                    (true, 'S') => 1.0,
                    _ => return None,
                };
                total += amount * factor;
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn keeps_explicit_offset() {
        let dt = parse_timestamp("2024-03-01T08:30:00+02:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 7200);
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn offsetless_is_utc() {
        let dt = parse_timestamp("2024-03-01T08:30:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        let z = parse_timestamp("2024-03-01T08:30:00Z").unwrap();
        assert_eq!(dt, z);
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn signature_formats_sign_and_minutes() {
        assert_eq!(offset_signature(&FixedOffset::east_opt(0).unwrap()), "+00:00");
        assert_eq!(
            offset_signature(&FixedOffset::west_opt(5 * 3600 + 1800).unwrap()),
            "-05:30"
        );
    }

    #[test]
    fn iso_durations() {
        assert_eq!(parse_iso_duration("PT1H30M"), Some(5400.0));
        assert_eq!(parse_iso_duration("P1DT2H"), Some(93_600.0));
        assert_eq!(parse_iso_duration("PT0.5H"), Some(1800.0));
        assert_eq!(parse_iso_duration("PT45S"), Some(45.0));
        assert_eq!(parse_iso_duration("P1M"), None);
        assert_eq!(parse_iso_duration("PT"), None);
        assert_eq!(parse_iso_duration("1H"), None);
    }

    #[test]
    fn epoch_millis() {
        let dt = from_epoch_millis(0.0).unwrap();
        assert_eq!(dt.timestamp(), 0);
        assert!(from_epoch_millis(f64::NAN).is_none());
    }
}
