//! Missing-value policies
//!
//! A policy decides what a reducer sees when some of its inputs are null
//! or NaN. Cleaning either yields the sequence to reduce or `None`, which
//! means the aggregation is undefined for this input.
//!
//! | Policy | Effect |
//! |--------|--------|
//! | [`MissingPolicy::Keep`] | pass values through unchanged |
//! | [`MissingPolicy::Ignore`] | drop missing values (default) |
//! | [`MissingPolicy::Zero`] | replace missing values with `0` |
//! | [`MissingPolicy::Propagate`] | undefined if any value is missing |
//! | [`MissingPolicy::NoneIfEmpty`] | undefined if there are no values at all |
//!
//! Under `Keep` a missing value still reaches the reducer. Numeric reducers
//! skip null and NaN alike, while `count`, `first`, `last` and `keep` see
//! both as values.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tidemark_core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    #[serde(alias = "keep_missing")]
    Keep,
    #[default]
    #[serde(alias = "ignore_missing")]
    Ignore,
    #[serde(alias = "zero_missing")]
    Zero,
    #[serde(alias = "propagate_missing")]
    Propagate,
    NoneIfEmpty,
}

impl MissingPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            MissingPolicy::Keep => "keep_missing",
            MissingPolicy::Ignore => "ignore_missing",
            MissingPolicy::Zero => "zero_missing",
            MissingPolicy::Propagate => "propagate_missing",
            MissingPolicy::NoneIfEmpty => "none_if_empty",
        }
    }

    /// Clean `values` for reduction, borrowing when nothing changes.
    pub fn clean<'a>(&self, values: &'a [Value]) -> Option<Cow<'a, [Value]>> {
        match self {
            MissingPolicy::Keep => Some(Cow::Borrowed(values)),
            MissingPolicy::Ignore => {
                if values.iter().any(Value::is_missing) {
                    Some(Cow::Owned(
                        values.iter().filter(|v| !v.is_missing()).cloned().collect(),
                    ))
                } else {
                    Some(Cow::Borrowed(values))
                }
            }
            MissingPolicy::Zero => {
                if values.iter().any(Value::is_missing) {
                    Some(Cow::Owned(
                        values
                            .iter()
                            .map(|v| if v.is_missing() { Value::Int(0) } else { v.clone() })
                            .collect(),
                    ))
                } else {
                    Some(Cow::Borrowed(values))
                }
            }
            MissingPolicy::Propagate => {
                if values.iter().any(Value::is_missing) {
                    None
                } else {
                    Some(Cow::Borrowed(values))
                }
            }
            MissingPolicy::NoneIfEmpty => {
                if values.is_empty() {
                    None
                } else {
                    Some(Cow::Borrowed(values))
                }
            }
        }
    }
}
