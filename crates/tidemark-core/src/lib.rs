//! # Tidemark Core
//!
//! Foundational types shared by Tidemark event collections.
//!
//! - [`value`]: field values, including the missing-value model
//! - [`field`]: field paths and single/multi field specifications
//! - [`key`]: the [`Key`] trait and the `Time`, `TimeRange` and `IndexKey` keys
//! - [`error`]: errors raised while constructing keys
//!
//! ## Quick Start
//!
//! ```rust
//! use tidemark_core::{FieldPath, IndexKey, Key, Time, Value};
//!
//! let t = Time::from_millis(1_000).unwrap();
//! assert_eq!(t.to_string(), "1000");
//!
//! let bucket = IndexKey::parse("5m-2").unwrap();
//! assert_eq!(bucket.begin().timestamp_millis(), 600_000);
//!
//! assert!(Value::Float(f64::NAN).is_missing());
//! assert_eq!(FieldPath::parse("in.total").to_string(), "in.total");
//! ```

pub mod error;
pub mod field;
pub mod key;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use field::{FieldPath, FieldSpec, DEFAULT_FIELD};
pub use key::{parse_window, IndexKey, Key, KeyType, Time, TimeRange};
pub use value::Value;
