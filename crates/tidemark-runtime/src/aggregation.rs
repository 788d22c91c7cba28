//! Aggregation functions for event collections.
//!
//! A reducer turns a sequence of field values into one summary value. Every
//! reducer carries a [`MissingPolicy`] that cleans its input first; when the
//! policy declares the input undefined, or the reducer has nothing to work
//! with, the result is `None`. That `None` is the "no answer" signal and is
//! distinct from `Some(Value::Null)`, which `first`/`last`/`keep` can return
//! when a null value itself was selected.
//!
//! # Available Aggregations
//!
//! | Function | Result | Empty input |
//! |----------|--------|-------------|
//! | [`Sum`] | total | `0` |
//! | [`Avg`] | mean | `None` |
//! | [`Min`] / [`Max`] | extrema, `None` unless finite | `None` |
//! | [`Count`] | number of cleaned values | `0` |
//! | [`First`] / [`Last`] | first/last cleaned value as-is | `None` |
//! | [`Median`] | middle value, or mean of the two middles | `None` |
//! | [`StdDev`] | population standard deviation | `None` |
//! | [`Difference`] | max - min | `None` |
//! | [`Keep`] | the common value when all values agree | `None` |
//! | [`Percentile`] | rank-interpolated percentile | `None` |
//!
//! Numeric reducers read `Int` and `Float` values and skip anything else.
//!
//! # Example
//!
//! ```rust
//! use tidemark_core::Value;
//! use tidemark_runtime::aggregation::{AggregateFunc, Avg, Sum};
//! use tidemark_runtime::policy::MissingPolicy;
//!
//! let values = vec![Value::Null, Value::Int(1), Value::Int(2)];
//! assert_eq!(Sum::new(MissingPolicy::Zero).apply(&values), Some(Value::Float(3.0)));
//! assert_eq!(Avg::new(MissingPolicy::Propagate).apply(&values), None);
//! ```

use crate::error::{CollectionError, CollectionResult};
use crate::event::SharedEvent;
use crate::policy::MissingPolicy;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tidemark_core::{FieldPath, Key, Value};
use tracing::warn;

/// Result type for named multi-aggregations.
pub type AggResult = IndexMap<String, Option<Value>>;

/// A reducer over field values.
///
/// Implementations are stateless and must be `Send + Sync` so one instance
/// can be shared across any number of aggregations.
pub trait AggregateFunc: Send + Sync {
    /// Returns the name of this aggregation function (e.g., "sum", "avg").
    fn name(&self) -> &str;

    /// The missing-value policy applied before reduction.
    fn policy(&self) -> MissingPolicy;

    /// Reduce `values`, or `None` when the aggregation is undefined.
    fn apply(&self, values: &[Value]) -> Option<Value>;
}

// =============================================================================
// Interpolation
// =============================================================================

/// How a rank that falls between two sorted values is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Linear,
    Lower,
    Higher,
    Nearest,
    Midpoint,
}

impl Interpolation {
    /// Value between `lower` and `upper` at `fraction` (0..1) of the way.
    ///
    /// A zero fraction always lands exactly on `lower`.
    pub fn interpolate(self, lower: f64, upper: f64, fraction: f64) -> f64 {
        if fraction == 0.0 {
            return lower;
        }
        match self {
            Interpolation::Linear => lower + (upper - lower) * fraction,
            Interpolation::Lower => lower,
            Interpolation::Higher => upper,
            Interpolation::Nearest => {
                if fraction < 0.5 {
                    lower
                } else {
                    upper
                }
            }
            Interpolation::Midpoint => (lower + upper) / 2.0,
        }
    }
}

/// Value at rank `numerator * (len - 1) / denominator` of an ascending slice.
///
/// The rank is kept as a ratio so that ranks landing on an index come out
/// exact, with a zero fractional part. The two entries bracketing the rank
/// are combined per `interp`. `None` when the rank has no upper neighbour,
/// which callers handle as their own boundary case.
pub fn split_point(
    sorted: &[f64],
    numerator: f64,
    denominator: f64,
    interp: Interpolation,
) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let scaled = numerator * last as f64;
    let index = (scaled / denominator).floor();
    let fraction = (scaled - index * denominator) / denominator;
    let index = index as usize;
    if index >= last {
        return None;
    }
    let lower = sorted[index];
    let upper = sorted[index + 1];
    Some(interp.interpolate(lower, upper, fraction))
}

/// Numeric inputs of a reducer. Null, NaN and non-numeric values are skipped.
fn numbers(values: &[Value]) -> Vec<f64> {
    values
        .iter()
        .filter_map(Value::as_float)
        .filter(|n| !n.is_nan())
        .collect()
}

pub(crate) fn sorted_numbers(values: &[Value]) -> Vec<f64> {
    let mut nums = numbers(values);
    nums.sort_by(f64::total_cmp);
    nums
}

/// Field values of `path` across `events`, absent fields read as null.
pub fn extract<K: Key>(events: &[SharedEvent<K>], path: &FieldPath) -> Vec<Value> {
    events
        .iter()
        .map(|e| e.get_path(path).cloned().unwrap_or(Value::Null))
        .collect()
}

// =============================================================================
// Reducers
// =============================================================================

macro_rules! reducer {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name {
            pub policy: MissingPolicy,
        }

        impl $name {
            pub fn new(policy: MissingPolicy) -> Self {
                Self { policy }
            }
        }
    };
}

reducer!(
    /// Arithmetic total; zero for an empty input.
    Sum
);
reducer!(
    /// Arithmetic mean.
    Avg
);
reducer!(
    /// Smallest value.
    Min
);
reducer!(
    /// Largest value.
    Max
);
reducer!(
    /// Number of values left after cleaning.
    Count
);
reducer!(
    /// First value in input order.
    First
);
reducer!(
    /// Last value in input order.
    Last
);
reducer!(
    /// Middle value of the sorted input.
    Median
);
reducer!(
    /// Population standard deviation.
    ///
    /// The denominator is the length of the input *before* cleaning, so
    /// values dropped by the policy still count toward it.
    StdDev
);
reducer!(
    /// Spread between largest and smallest value.
    Difference
);
reducer!(
    /// Carries a constant field through an aggregation: the first value
    /// when every value equals it, otherwise undefined.
    Keep
);

impl AggregateFunc for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        Some(Value::Float(numbers(&cleaned).iter().sum()))
    }
}

impl AggregateFunc for Avg {
    fn name(&self) -> &str {
        "avg"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let nums = numbers(&cleaned);
        if nums.is_empty() {
            return None;
        }
        Some(Value::Float(nums.iter().sum::<f64>() / nums.len() as f64))
    }
}

impl AggregateFunc for Min {
    fn name(&self) -> &str {
        "min"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let min = numbers(&cleaned)
            .into_iter()
            .fold(f64::INFINITY, f64::min);
        min.is_finite().then_some(Value::Float(min))
    }
}

impl AggregateFunc for Max {
    fn name(&self) -> &str {
        "max"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let max = numbers(&cleaned)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max);
        max.is_finite().then_some(Value::Float(max))
    }
}

impl AggregateFunc for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        Some(Value::Int(cleaned.len() as i64))
    }
}

impl AggregateFunc for First {
    fn name(&self) -> &str {
        "first"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        self.policy.clean(values)?.first().cloned()
    }
}

impl AggregateFunc for Last {
    fn name(&self) -> &str {
        "last"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        self.policy.clean(values)?.last().cloned()
    }
}

impl AggregateFunc for Median {
    fn name(&self) -> &str {
        "median"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let nums = sorted_numbers(&cleaned);
        if nums.is_empty() {
            return None;
        }
        let mid = nums.len() / 2;
        let median = if nums.len() % 2 == 0 {
            (nums[mid - 1] + nums[mid]) / 2.0
        } else {
            nums[mid]
        };
        Some(Value::Float(median))
    }
}

impl AggregateFunc for StdDev {
    fn name(&self) -> &str {
        "stdev"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let nums = numbers(&cleaned);
        if nums.is_empty() {
            return None;
        }
        let mean = nums.iter().sum::<f64>() / nums.len() as f64;
        let squares: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
        Some(Value::Float((squares / values.len() as f64).sqrt()))
    }
}

impl AggregateFunc for Difference {
    fn name(&self) -> &str {
        "difference"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let nums = numbers(&cleaned);
        if nums.is_empty() {
            return None;
        }
        let min = nums.iter().copied().fold(f64::INFINITY, f64::min);
        let max = nums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Value::Float(max - min))
    }
}

impl AggregateFunc for Keep {
    fn name(&self) -> &str {
        "keep"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let first = cleaned.first()?;
        cleaned
            .iter()
            .all(|v| v == first)
            .then(|| first.clone())
    }
}

/// The `q`th percentile (0..=100) of the input.
///
/// `q = 0` is the minimum, `q = 100` the maximum, and a single value is its
/// own percentile; anything in between is interpolated per
/// [`Interpolation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentile {
    q: f64,
    interpolation: Interpolation,
    policy: MissingPolicy,
}

impl Percentile {
    pub fn new(
        q: f64,
        interpolation: Interpolation,
        policy: MissingPolicy,
    ) -> CollectionResult<Self> {
        if !(0.0..=100.0).contains(&q) {
            warn!(q, "rejected percentile outside [0, 100]");
            return Err(CollectionError::PercentileOutOfRange { q });
        }
        Ok(Self {
            q,
            interpolation,
            policy,
        })
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }
}

impl AggregateFunc for Percentile {
    fn name(&self) -> &str {
        "percentile"
    }

    fn policy(&self) -> MissingPolicy {
        self.policy
    }

    fn apply(&self, values: &[Value]) -> Option<Value> {
        let cleaned = self.policy.clean(values)?;
        let sorted = sorted_numbers(&cleaned);
        let (first, last) = (sorted.first()?, sorted.last()?);
        if sorted.len() == 1 || self.q == 0.0 {
            return Some(Value::Float(*first));
        }
        if self.q == 100.0 {
            return Some(Value::Float(*last));
        }
        split_point(&sorted, self.q, 100.0, self.interpolation).map(Value::Float)
    }
}

// =============================================================================
// Aggregation results
// =============================================================================

/// Result of aggregating a collection over a [`FieldSpec`](tidemark_core::FieldSpec).
///
/// A single field yields `Value`; a list of fields yields one entry per
/// field, keyed by the field path.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutput {
    Value(Option<Value>),
    Fields(AggResult),
}

impl AggregateOutput {
    /// The scalar result; `None` when undefined or for a field list.
    pub fn value(&self) -> Option<&Value> {
        match self {
            AggregateOutput::Value(v) => v.as_ref(),
            AggregateOutput::Fields(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            AggregateOutput::Value(v) => v,
            AggregateOutput::Fields(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        self.value().and_then(Value::as_float)
    }

    /// One field's result from a field-list aggregation.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            AggregateOutput::Fields(fields) => fields.get(name).and_then(Option::as_ref),
            AggregateOutput::Value(_) => None,
        }
    }

    pub fn fields(&self) -> Option<&AggResult> {
        match self {
            AggregateOutput::Fields(fields) => Some(fields),
            AggregateOutput::Value(_) => None,
        }
    }
}

/// Aggregator that can apply multiple named aggregations at once.
pub struct Aggregator {
    aggregations: Vec<(String, Box<dyn AggregateFunc>, FieldPath)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            aggregations: Vec::new(),
        }
    }

    pub fn add(
        mut self,
        alias: impl Into<String>,
        func: Box<dyn AggregateFunc>,
        field: impl Into<FieldPath>,
    ) -> Self {
        self.aggregations.push((alias.into(), func, field.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.aggregations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregations.is_empty()
    }

    pub fn apply<K: Key>(&self, events: &[SharedEvent<K>]) -> AggResult {
        let mut result = IndexMap::with_capacity(self.aggregations.len());
        for (alias, func, field) in &self.aggregations {
            let values = extract(events, field);
            result.insert(alias.clone(), func.apply(&values));
        }
        result
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
