//! Property tests for the order-sensitive key codecs.

use crate::keys::{escape, reverse_time, unescape, unreverse_time};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn arb_instant() -> impl Strategy<Value = chrono::DateTime<Utc>> {
    // 1970..=2199, with optional millisecond precision.
    (0_i64..7_258_118_400, prop::option::of(0_u32..1_000)).prop_map(|(secs, millis)| {
        Utc.timestamp_opt(secs, millis.unwrap_or(0) * 1_000_000)
            .unwrap()
    })
}

proptest! {
    #[test]
    fn reverse_time_round_trips(t in arb_instant()) {
        let encoded = reverse_time(t);
        prop_assert_eq!(unreverse_time(&encoded).unwrap(), t);
    }

    #[test]
    fn reverse_time_reverses_byte_order(a in arb_instant(), b in arb_instant()) {
        // Restrict to second precision so string order is total.
        let a = Utc.timestamp_opt(a.timestamp(), 0).unwrap();
        let b = Utc.timestamp_opt(b.timestamp(), 0).unwrap();

        let (ra, rb) = (reverse_time(a), reverse_time(b));
        match a.cmp(&b) {
            std::cmp::Ordering::Less => prop_assert!(ra > rb),
            std::cmp::Ordering::Equal => prop_assert_eq!(ra, rb),
            std::cmp::Ordering::Greater => prop_assert!(ra < rb),
        }
    }

    #[test]
    fn escape_round_trips(token in "\\PC*") {
        let escaped = escape(&token);
        let unescaped = unescape(&escaped);
        prop_assert_eq!(unescaped.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn escaped_tokens_never_contain_separator(token in "\\PC*") {
        prop_assert!(!escape(&token).contains('|'));
    }
}
