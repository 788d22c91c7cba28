//! Coverage tests for aggregation functions.
//!
//! Tests every `AggregateFunc` implementation against each missing-value
//! policy, the multi-aggregation `Aggregator`, and reducers shared across
//! threads.

use std::sync::Arc;
use std::thread;
use tidemark_core::{Time, Value};
use tidemark_runtime::aggregation::*;
use tidemark_runtime::collection::Collection;
use tidemark_runtime::event::Event;
use tidemark_runtime::policy::MissingPolicy;

// ==========================================================================
// Helpers
// ==========================================================================

const POLICIES: [MissingPolicy; 5] = [
    MissingPolicy::Keep,
    MissingPolicy::Ignore,
    MissingPolicy::Zero,
    MissingPolicy::Propagate,
    MissingPolicy::NoneIfEmpty,
];

fn all_reducers(policy: MissingPolicy) -> Vec<Box<dyn AggregateFunc>> {
    vec![
        Box::new(Sum::new(policy)),
        Box::new(Avg::new(policy)),
        Box::new(Min::new(policy)),
        Box::new(Max::new(policy)),
        Box::new(Count::new(policy)),
        Box::new(First::new(policy)),
        Box::new(Last::new(policy)),
        Box::new(Median::new(policy)),
        Box::new(StdDev::new(policy)),
        Box::new(Difference::new(policy)),
        Box::new(Keep::new(policy)),
        Box::new(Percentile::new(50.0, Interpolation::Linear, policy).unwrap()),
    ]
}

fn assert_float_near(val: Option<Value>, expected: f64) {
    match val {
        Some(Value::Float(v)) => {
            assert!((v - expected).abs() < 1e-9, "Expected ~{expected}, got {v}");
        }
        other => panic!("Expected Some(Value::Float), got {:?}", other),
    }
}

// ==========================================================================
// Policy behaviour across all reducers
// ==========================================================================

#[test]
fn test_propagate_makes_every_reducer_undefined() {
    let values = vec![Value::Int(1), Value::Null, Value::Int(3)];
    for func in all_reducers(MissingPolicy::Propagate) {
        assert_eq!(func.apply(&values), None, "{} should be undefined", func.name());
    }
}

#[test]
fn test_none_if_empty_makes_every_reducer_undefined_on_empty() {
    for func in all_reducers(MissingPolicy::NoneIfEmpty) {
        assert_eq!(func.apply(&[]), None, "{} should be undefined", func.name());
    }
}

#[test]
fn test_every_reducer_reports_its_policy() {
    for policy in POLICIES {
        for func in all_reducers(policy) {
            assert_eq!(func.policy(), policy);
        }
    }
}

#[test]
fn test_nan_counts_as_missing() {
    let values = vec![Value::Float(f64::NAN), Value::Float(2.0), Value::Float(4.0)];
    assert_float_near(Avg::default().apply(&values), 3.0);
    assert_float_near(Avg::new(MissingPolicy::Zero).apply(&values), 2.0);
    assert_eq!(Avg::new(MissingPolicy::Propagate).apply(&values), None);
}

#[test]
fn test_keep_treats_null_and_nan_alike() {
    let with_null = vec![Value::Null, Value::Int(1), Value::Int(3)];
    let with_nan = vec![Value::Float(f64::NAN), Value::Int(1), Value::Int(3)];
    for input in [&with_null, &with_nan] {
        assert_float_near(Sum::new(MissingPolicy::Keep).apply(input), 4.0);
        assert_float_near(Avg::new(MissingPolicy::Keep).apply(input), 2.0);
        assert_float_near(Max::new(MissingPolicy::Keep).apply(input), 3.0);
        assert_float_near(Median::new(MissingPolicy::Keep).apply(input), 2.0);
        assert_eq!(Count::new(MissingPolicy::Keep).apply(input), Some(Value::Int(3)));
    }
}

#[test]
fn test_non_numeric_values_skipped_by_numeric_reducers() {
    let values = vec![Value::from("n/a"), Value::Int(2), Value::Int(6)];
    assert_float_near(Sum::default().apply(&values), 8.0);
    assert_float_near(Avg::default().apply(&values), 4.0);
    assert_eq!(Count::default().apply(&values), Some(Value::Int(3)));
    assert_eq!(First::default().apply(&values), Some(Value::from("n/a")));
}

// ==========================================================================
// Single-value edge cases
// ==========================================================================

#[test]
fn test_single_value() {
    let values = vec![Value::Int(7)];
    assert_float_near(Sum::default().apply(&values), 7.0);
    assert_float_near(Avg::default().apply(&values), 7.0);
    assert_float_near(Median::default().apply(&values), 7.0);
    assert_float_near(StdDev::default().apply(&values), 0.0);
    assert_float_near(Difference::default().apply(&values), 0.0);
    assert_eq!(Keep::default().apply(&values), Some(Value::Int(7)));
    for interp in [
        Interpolation::Linear,
        Interpolation::Lower,
        Interpolation::Higher,
        Interpolation::Nearest,
        Interpolation::Midpoint,
    ] {
        let p = Percentile::new(37.0, interp, MissingPolicy::Ignore).unwrap();
        assert_float_near(p.apply(&values), 7.0);
    }
}

#[test]
fn test_large_input() {
    let values: Vec<Value> = (1..=10_000).map(Value::Int).collect();
    assert_float_near(Sum::default().apply(&values), 50_005_000.0);
    assert_float_near(Avg::default().apply(&values), 5_000.5);
    assert_float_near(Median::default().apply(&values), 5_000.5);
    let p90 = Percentile::new(90.0, Interpolation::Linear, MissingPolicy::Ignore).unwrap();
    assert_float_near(p90.apply(&values), 9_000.1);
}

// ==========================================================================
// Aggregator
// ==========================================================================

#[test]
fn test_aggregator_named_results() {
    let c: Collection<Time> = (0..4)
        .map(|i| {
            Event::new(Time::from_millis(i).unwrap())
                .with_field("price", (i + 1) as f64)
                .with_field("symbol", "ACME")
        })
        .collect();

    let aggregator = Aggregator::new()
        .add("total", Box::new(Sum::default()), "price")
        .add("n", Box::new(Count::default()), "price")
        .add("symbol", Box::new(Keep::default()), "symbol")
        .add("absent", Box::new(Avg::default()), "volume");
    assert_eq!(aggregator.len(), 4);

    let result = c.aggregate_all(&aggregator);
    let names: Vec<&str> = result.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["total", "n", "symbol", "absent"]);
    assert_eq!(result["total"], Some(Value::Float(10.0)));
    assert_eq!(result["n"], Some(Value::Int(4)));
    assert_eq!(result["symbol"], Some(Value::from("ACME")));
    assert_eq!(result["absent"], None);
}

#[test]
fn test_reducers_shared_across_threads() {
    let func: Arc<dyn AggregateFunc> = Arc::new(Median::default());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let func = Arc::clone(&func);
            thread::spawn(move || {
                let values: Vec<Value> = (0..=i * 2).map(Value::Int).collect();
                func.apply(&values)
            })
        })
        .collect();
    let results: Vec<Option<Value>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        results,
        vec![
            Some(Value::Float(0.0)),
            Some(Value::Float(1.0)),
            Some(Value::Float(2.0)),
            Some(Value::Float(3.0)),
        ]
    );
}
