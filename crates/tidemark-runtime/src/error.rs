//! Errors raised for misuse of collections and reducers
//!
//! Only precondition violations are errors. An aggregation with no
//! meaningful answer returns `None` instead.

use thiserror::Error;
use tidemark_core::CoreError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollectionError {
    #[error("Quantile count {n} exceeds collection size {size}")]
    QuantileExceedsSize { n: usize, size: usize },

    #[error("Quantile count must be at least 1")]
    ZeroQuantiles,

    #[error("Percentile {q} is outside [0, 100]")]
    PercentileOutOfRange { q: f64 },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type CollectionResult<T> = Result<T, CollectionError>;
