//! Keyed event records

use crate::aggregation::AggregateFunc;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidemark_core::{FieldPath, FieldSpec, Key, KeyType, Value};

/// Type alias for IndexMap with FxBuildHasher for faster hashing of event fields.
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// A shared reference to an Event.
///
/// Collections hold events behind `Arc` so that every derived collection
/// can reuse the records of its ancestor without copying them.
pub type SharedEvent<K> = Arc<Event<K>>;

/// An immutable (key, fields) record.
///
/// Builder methods consume the event and return a new one; nothing mutates
/// an event once it has been placed in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<K> {
    key: K,
    data: FxIndexMap<String, Value>,
}

impl<K: Key> Event<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            data: IndexMap::with_hasher(FxBuildHasher),
        }
    }

    /// Creates a new event with pre-allocated capacity for fields.
    pub fn with_capacity(key: K, capacity: usize) -> Self {
        Self {
            key,
            data: IndexMap::with_capacity_and_hasher(capacity, FxBuildHasher),
        }
    }

    /// Creates a new event from a pre-built fields map.
    pub fn from_fields(key: K, data: FxIndexMap<String, Value>) -> Self {
        Self { key, data }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Same key, new fields.
    pub fn set_data(&self, data: FxIndexMap<String, Value>) -> Self {
        Self {
            key: self.key.clone(),
            data,
        }
    }

    /// Same fields, new key (possibly of another key type).
    pub fn with_key<U: Key>(&self, key: U) -> Event<U> {
        Event {
            key,
            data: self.data.clone(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn key_type(&self) -> KeyType {
        self.key.key_type()
    }

    pub fn data(&self) -> &FxIndexMap<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.key.timestamp()
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.key.begin()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.key.end()
    }

    /// Look up a dotted field path such as `"in.total"`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.contains('.') {
            self.get_path(&FieldPath::parse(path))
        } else {
            self.data.get(path)
        }
    }

    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        path.resolve(&self.data)
    }

    pub fn get_float(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_float())
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// True when the field exists and is neither null nor NaN.
    pub fn is_valid(&self, path: &FieldPath) -> bool {
        self.get_path(path).is_some_and(|v| !v.is_missing())
    }

    /// Project onto the listed fields, keeping the key.
    ///
    /// Each retained field is stored under its full path name. Fields the
    /// event does not carry are omitted rather than filled with null.
    pub fn select(&self, paths: &[FieldPath]) -> Self {
        let mut data = IndexMap::with_capacity_and_hasher(paths.len(), FxBuildHasher);
        for path in paths {
            if let Some(value) = self.get_path(path) {
                data.insert(path.to_string(), value.clone());
            }
        }
        self.set_data(data)
    }

    /// Merge events into one: key of the first, union of all fields with
    /// later events overriding earlier ones. `None` for an empty slice.
    pub fn merge(events: &[SharedEvent<K>]) -> Option<Self> {
        let (first, rest) = events.split_first()?;
        let mut data = first.data.clone();
        for event in rest {
            for (name, value) in &event.data {
                data.insert(name.clone(), value.clone());
            }
        }
        Some(first.set_data(data))
    }

    /// Combine events that share a key by reducing each field across them.
    ///
    /// Produces one event per distinct key string, in first-seen order.
    /// With `spec` only the named fields are reduced; otherwise every
    /// top-level field seen in the group is. A reducer with no answer
    /// stores `Value::Null`.
    pub fn combine(
        events: &[SharedEvent<K>],
        reducer: &dyn AggregateFunc,
        spec: Option<&FieldSpec>,
    ) -> Vec<Self> {
        let mut groups: IndexMap<String, Vec<&SharedEvent<K>>> = IndexMap::new();
        for event in events {
            groups.entry(event.key.to_string()).or_default().push(event);
        }

        let mut combined = Vec::with_capacity(groups.len());
        for group in groups.values() {
            let Some(first) = group.first() else {
                continue;
            };
            let paths: Vec<FieldPath> = match spec {
                Some(spec) => spec.paths().to_vec(),
                None => {
                    let mut names: IndexMap<&str, ()> = IndexMap::new();
                    for event in group {
                        for name in event.data.keys() {
                            names.insert(name.as_str(), ());
                        }
                    }
                    names
                        .keys()
                        .map(|name| FieldPath::parse(name))
                        .collect()
                }
            };

            let mut data = IndexMap::with_capacity_and_hasher(paths.len(), FxBuildHasher);
            for path in &paths {
                let values: Vec<Value> = group
                    .iter()
                    .map(|e| e.get_path(path).cloned().unwrap_or(Value::Null))
                    .collect();
                let reduced = reducer.apply(&values).unwrap_or(Value::Null);
                data.insert(path.to_string(), reduced);
            }
            combined.push(first.set_data(data));
        }
        combined
    }
}
