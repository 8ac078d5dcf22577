//! Reversed-time encoding.
//!
//! `rt` + the RFC-3339 UTC string with every decimal digit `d` replaced by
//! `9 - d`. The transform is an involution on the digit positions, and it is
//! strictly byte-lex order-reversing over RFC-3339 strings, so a forward
//! prefix scan over reversed keys yields newest-first.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error as ThisError;

const PREFIX: &str = "rt";

#[derive(Debug, ThisError)]
pub enum RevTimeError {
    #[error("missing 'rt' prefix")]
    MissingPrefix,

    #[error("not an RFC-3339 time after digit reversal: {0}")]
    BadTime(String),
}

/// Canonical RFC-3339 UTC rendering used in row keys and values: trailing
/// `Z`, seconds precision, subseconds only when nonzero.
#[must_use]
pub fn format_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

fn flip_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '0'..='9' => {
                let d = c as u8 - b'0';
                char::from(b'9' - d)
            }
            other => other,
        })
        .collect()
}

/// Encode an instant in reversed form.
#[must_use]
pub fn reverse_time(t: DateTime<Utc>) -> String {
    reverse_time_str(&format_rfc3339(t))
}

/// Encode an already-rendered RFC-3339 string in reversed form.
#[must_use]
pub fn reverse_time_str(rfc3339: &str) -> String {
    let mut out = String::with_capacity(PREFIX.len() + rfc3339.len());
    out.push_str(PREFIX);
    out.push_str(&flip_digits(rfc3339));
    out
}

/// Decode a reversed key part back to an instant.
pub fn unreverse_time(encoded: &str) -> Result<DateTime<Utc>, RevTimeError> {
    let body = encoded
        .strip_prefix(PREFIX)
        .ok_or(RevTimeError::MissingPrefix)?;
    let forward = flip_digits(body);
    parse_rfc3339(&forward).map_err(|_| RevTimeError::BadTime(forward))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn known_vector() {
        let t = Utc.with_ymd_and_hms(2011, 11, 27, 1, 23, 45).unwrap();
        let encoded = reverse_time(t);
        assert_eq!(encoded, "rt7988-88-72T98:76:54Z");
        assert_eq!(unreverse_time(&encoded).unwrap(), t);
    }

    #[test]
    fn later_times_sort_earlier() {
        let a = Utc.with_ymd_and_hms(2011, 11, 27, 1, 23, 45).unwrap();
        let b = Utc.with_ymd_and_hms(2011, 11, 27, 1, 23, 46).unwrap();
        let c = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        assert!(reverse_time(b) < reverse_time(a));
        assert!(reverse_time(c) < reverse_time(b));
    }

    #[test]
    fn subsecond_times_round_trip() {
        let t = Utc.timestamp_opt(1_322_357_025, 123_000_000).unwrap();
        assert_eq!(unreverse_time(&reverse_time(t)).unwrap(), t);
    }

    #[test]
    fn rejects_garbage() {
        assert!(unreverse_time("2011-11-27T01:23:45Z").is_err());
        assert!(unreverse_time("rtnonsense").is_err());
    }
}
