//! Property-based tests for key and value types.
//!
//! Covers: index-key bucket arithmetic, time-range normalization, the
//! field ordering used for sorting, and serde round-trips of keys.

use proptest::prelude::*;
use std::cmp::Ordering;
use tidemark_core::{parse_window, FieldPath, IndexKey, Key, Time, TimeRange, Value};

const DAY_MS: i64 = 86_400_000;

fn arb_window() -> impl Strategy<Value = String> {
    (1i64..120, prop::sample::select(vec!["ms", "s", "m", "h", "d"]))
        .prop_map(|(n, unit)| format!("{n}{unit}"))
}

fn arb_sortable() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(Value::Float(f64::NAN)),
        (-1000i64..1000).prop_map(Value::Int),
        (-1000.0f64..1000.0).prop_map(Value::Float),
    ]
}

proptest! {
    /// The bucket containing an instant really contains it.
    #[test]
    fn containing_bucket_holds_instant(window in arb_window(), at in 0i64..(365 * DAY_MS)) {
        let instant = Time::from_millis(at).unwrap();
        let key = IndexKey::containing(&window, instant.timestamp()).unwrap();
        prop_assert!(key.begin() <= instant.timestamp());
        prop_assert!(instant.timestamp() < key.end());
        prop_assert_eq!(
            (key.end() - key.begin()).num_milliseconds(),
            parse_window(&window).unwrap()
        );
    }

    /// Parsing the string form of a key yields the same key.
    #[test]
    fn index_key_string_roundtrip(window in arb_window(), number in -1000i64..1000) {
        let key = IndexKey::parse(&format!("{window}-{number}")).unwrap();
        let again = IndexKey::parse(&key.to_string()).unwrap();
        prop_assert_eq!(&key, &again);
        let json = serde_json::to_string(&key).unwrap();
        prop_assert_eq!(json, format!("\"{window}-{number}\""));
    }

    /// Endpoints in either order describe the same range.
    #[test]
    fn time_range_normalizes(a in -DAY_MS..DAY_MS, b in -DAY_MS..DAY_MS) {
        let forward = TimeRange::from_millis(a, b).unwrap();
        let backward = TimeRange::from_millis(b, a).unwrap();
        prop_assert_eq!(forward, backward);
        prop_assert!(forward.begin() <= forward.end());
        prop_assert_eq!(forward.to_string(), backward.to_string());
    }

    /// Missing values always sort after present ones.
    #[test]
    fn missing_values_sort_last(mut values in prop::collection::vec(arb_sortable(), 0..30)) {
        values.sort_by(Value::sort_cmp);
        let first_missing = values.iter().position(Value::is_missing).unwrap_or(values.len());
        prop_assert!(values[first_missing..].iter().all(Value::is_missing));
        for pair in values[..first_missing].windows(2) {
            prop_assert_ne!(pair[0].sort_cmp(&pair[1]), Ordering::Greater);
        }
    }

    /// Field paths print back to the string they were parsed from.
    #[test]
    fn field_path_display_roundtrip(segments in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..4)) {
        let text = segments.join(".");
        let path = FieldPath::parse(&text);
        prop_assert_eq!(path.segments().len(), segments.len());
        prop_assert_eq!(path.to_string(), text);
    }
}

#[test]
fn test_rejects_malformed_index_keys() {
    for text in ["", "5m", "5x-1", "0m-1", "m-1", "5m-abc", "-5m-1"] {
        assert!(IndexKey::parse(text).is_err(), "{text:?} should be rejected");
    }
}

#[test]
fn test_negative_bucket_numbers() {
    let key = IndexKey::parse("1s--1").unwrap();
    assert_eq!(key.begin().timestamp_millis(), -1_000);
    assert_eq!(key.end().timestamp_millis(), 0);
}
