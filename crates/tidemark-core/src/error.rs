//! Core error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid index key '{0}': expected <window>-<number>, e.g. 5m-1234")]
    InvalidIndexKey(String),

    #[error("Invalid window duration '{0}': expected a positive count and one of ms, s, m, h, d")]
    InvalidWindow(String),

    #[error("Timestamp of {0}ms is outside the representable range")]
    TimestampOutOfRange(i64),
}

pub type CoreResult<T> = Result<T, CoreError>;
