//! Field paths and field specifications
//!
//! A [`FieldPath`] addresses one value inside an event's fields, descending
//! through nested maps by name and through arrays by numeric segment. A
//! [`FieldSpec`] is what aggregation entry points accept: either one path
//! (scalar result) or a list of paths (one result per path).

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::BuildHasher;

/// Field name used when a caller does not name one.
pub const DEFAULT_FIELD: &str = "value";

/// A path into an event's fields, e.g. `"in.total"` or `["readings", "0"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Build a path from explicit segments.
    ///
    /// The dotted string is the canonical form of a path, so a segment that
    /// contains dots is split like [`FieldPath::parse`] would split it.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments
            .into_iter()
            .flat_map(|segment| {
                let segment: String = segment.into();
                segment.split('.').map(str::to_string).collect::<Vec<_>>()
            })
            .collect();
        Self { segments }
    }

    /// Parse a dotted path.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, i.e. the top-level field the path starts from.
    pub fn root(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// Resolve this path against a field map.
    ///
    /// A nested path that does not descend falls back to a top-level field
    /// named by the whole dotted path, which is how projected events store
    /// nested values.
    pub fn resolve<'a, S: BuildHasher>(
        &self,
        fields: &'a IndexMap<String, Value, S>,
    ) -> Option<&'a Value> {
        match self.descend(fields) {
            Some(value) => Some(value),
            None if self.is_nested() => fields.get(self.to_string().as_str()),
            None => None,
        }
    }

    fn descend<'a, S: BuildHasher>(
        &self,
        fields: &'a IndexMap<String, Value, S>,
    ) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = fields.get(first.as_str())?;
        for segment in rest {
            current = match current {
                Value::Array(_) => current.get_index(segment.parse().ok()?)?,
                _ => current.get(segment)?,
            };
        }
        Some(current)
    }
}

impl Default for FieldPath {
    fn default() -> Self {
        Self::parse(DEFAULT_FIELD)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<&String> for FieldPath {
    fn from(path: &String) -> Self {
        Self::parse(path)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

/// One field or a list of fields to aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    Single(FieldPath),
    List(Vec<FieldPath>),
}

impl FieldSpec {
    /// All paths named by this spec, in order.
    pub fn paths(&self) -> &[FieldPath] {
        match self {
            FieldSpec::Single(path) => std::slice::from_ref(path),
            FieldSpec::List(paths) => paths,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, FieldSpec::Single(_))
    }
}

impl Default for FieldSpec {
    fn default() -> Self {
        FieldSpec::Single(FieldPath::default())
    }
}

impl From<FieldPath> for FieldSpec {
    fn from(path: FieldPath) -> Self {
        FieldSpec::Single(path)
    }
}

impl From<&str> for FieldSpec {
    fn from(path: &str) -> Self {
        FieldSpec::Single(FieldPath::parse(path))
    }
}

impl From<String> for FieldSpec {
    fn from(path: String) -> Self {
        FieldSpec::Single(FieldPath::parse(&path))
    }
}

impl From<Vec<FieldPath>> for FieldSpec {
    fn from(paths: Vec<FieldPath>) -> Self {
        FieldSpec::List(paths)
    }
}

impl From<Vec<&str>> for FieldSpec {
    fn from(paths: Vec<&str>) -> Self {
        FieldSpec::List(paths.into_iter().map(FieldPath::parse).collect())
    }
}

impl From<Vec<String>> for FieldSpec {
    fn from(paths: Vec<String>) -> Self {
        FieldSpec::List(paths.iter().map(FieldPath::from).collect())
    }
}

impl From<&[&str]> for FieldSpec {
    fn from(paths: &[&str]) -> Self {
        FieldSpec::List(paths.iter().copied().map(FieldPath::parse).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FieldSpec {
    fn from(paths: [&str; N]) -> Self {
        FieldSpec::List(paths.into_iter().map(FieldPath::parse).collect())
    }
}
