//! Property-based tests for collections and reducers.
//!
//! Covers: key index consistency after arbitrary insert/dedup/remove
//! sequences, immutability of the source, quantile and percentile
//! monotonicity, and the aggregate/field-list duality.

use proptest::prelude::*;
use tidemark_core::{Time, Value};
use tidemark_runtime::aggregation::Interpolation;
use tidemark_runtime::collection::{build_key_map, Collection, Dedup, SortedCollection};
use tidemark_runtime::event::Event;
use tidemark_runtime::policy::MissingPolicy;

#[derive(Debug, Clone)]
enum Op {
    Add(i64, i64),
    Replace(i64, i64),
    Remove(i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..8, -100i64..100).prop_map(|(k, v)| Op::Add(k, v)),
        (0i64..8, -100i64..100).prop_map(|(k, v)| Op::Replace(k, v)),
        (0i64..8).prop_map(Op::Remove),
    ]
}

fn arb_interpolation() -> impl Strategy<Value = Interpolation> {
    prop_oneof![
        Just(Interpolation::Linear),
        Just(Interpolation::Lower),
        Just(Interpolation::Higher),
        Just(Interpolation::Nearest),
        Just(Interpolation::Midpoint),
    ]
}

fn event(key: i64, value: i64) -> Event<Time> {
    Event::new(Time::from_millis(key).unwrap()).with_field("value", value)
}

fn column(values: &[f64]) -> Collection<Time> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Event::new(Time::from_millis(i as i64).unwrap()).with_field("value", v))
        .collect()
}

/// Whole numbers keep interpolation exact, so ordering checks are strict.
fn finite_values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((-1000i64..1000).prop_map(|v| v as f64), 1..40)
}

proptest! {
    /// The stored index always equals one rebuilt from the events.
    #[test]
    fn index_matches_events(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut c: Collection<Time> = Collection::new();
        for op in ops {
            c = match op {
                Op::Add(k, v) => c.add_event(event(k, v), Dedup::Keep),
                Op::Replace(k, v) => c.add_event(event(k, v), Dedup::Replace),
                Op::Remove(k) => c.remove_events(&Time::from_millis(k).unwrap()),
            };
            prop_assert_eq!(c.key_map(), &build_key_map(c.events()));
        }
    }

    /// Replace leaves exactly one event per replaced key.
    #[test]
    fn replace_leaves_one_event(keys in prop::collection::vec(0i64..5, 1..30)) {
        let mut c: Collection<Time> = Collection::new();
        for (i, k) in keys.iter().enumerate() {
            c = c.add_event(event(*k, i as i64), Dedup::Replace);
        }
        for k in &keys {
            prop_assert_eq!(c.at_key(&Time::from_millis(*k).unwrap()).len(), 1);
        }
    }

    /// A derived collection never changes its ancestor.
    #[test]
    fn ancestors_are_untouched(
        base in prop::collection::vec((0i64..10, -10i64..10), 0..20),
        extra in (0i64..10, -10i64..10),
    ) {
        let source: Collection<Time> = base.iter().map(|&(k, v)| event(k, v)).collect();
        let snapshot: Vec<_> = source.events().to_vec();

        let _ = source.add_event(event(extra.0, extra.1), Dedup::Replace);
        let _ = source.remove_events(&Time::from_millis(extra.0).unwrap());
        let _ = source.sort("value");
        let _ = source.take_last(3);

        prop_assert_eq!(source.events(), snapshot.as_slice());
    }

    /// A sorted collection stays chronological under any insertion order.
    #[test]
    fn sorted_collection_stays_chronological(keys in prop::collection::vec(0i64..1000, 0..30)) {
        let mut c: SortedCollection<Time> = Collection::new();
        for k in keys {
            c = c.add_event(event(k, 0), Dedup::Keep);
            prop_assert!(c.is_chronological());
        }
    }

    /// Quantile split points never decrease.
    #[test]
    fn quantiles_are_monotonic(
        values in finite_values(),
        n in 1usize..10,
        interp in arb_interpolation(),
    ) {
        let c = column(&values);
        prop_assume!(n <= c.size());
        let q = c.quantile(n, "value", interp).unwrap();
        prop_assert_eq!(q.len(), n - 1);
        for pair in q.windows(2) {
            prop_assert!(pair[0] <= pair[1], "{:?}", q);
        }
    }

    /// Percentiles are monotonic in q and pinned to min/max at the ends.
    #[test]
    fn percentiles_are_monotonic(
        values in finite_values(),
        interp in arb_interpolation(),
    ) {
        let c = column(&values);
        let at = |q: f64| {
            c.percentile(q, "value", interp, None).unwrap().as_float().unwrap()
        };
        prop_assert_eq!(Some(at(0.0)), c.min("value", None).as_float());
        prop_assert_eq!(Some(at(100.0)), c.max("value", None).as_float());

        let mut previous = at(0.0);
        for step in 1..=20 {
            let current = at(step as f64 * 5.0);
            prop_assert!(previous <= current);
            previous = current;
        }
    }

    /// Aggregating a field list equals aggregating each field alone.
    #[test]
    fn field_list_matches_single_fields(
        rows in prop::collection::vec((-50i64..50, prop::option::of(-50i64..50)), 0..20),
    ) {
        let c: Collection<Time> = rows
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                Event::new(Time::from_millis(i as i64).unwrap())
                    .with_field("a", *a)
                    .with_field("b", b.map(Value::Int).unwrap_or(Value::Null))
            })
            .collect();

        for policy in [MissingPolicy::Ignore, MissingPolicy::Zero, MissingPolicy::Propagate] {
            let both = c.avg(["a", "b"], Some(policy));
            let a = c.avg("a", Some(policy));
            let b = c.avg("b", Some(policy));
            prop_assert_eq!(both.field("a"), a.value());
            prop_assert_eq!(both.field("b"), b.value());
        }
    }
}
