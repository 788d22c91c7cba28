//! Immutable keyed event collections
//!
//! A [`Collection`] is an ordered list of shared events plus an index from
//! each event's key string to the positions holding that key. Collections
//! are never modified: every operation that "changes" one returns a new
//! collection and leaves the receiver, and anything derived from it,
//! untouched. Events themselves are reference counted and shared between
//! collections; only the event vector and index are copied.
//!
//! The index compares keys by their `Display` form, so two distinct keys
//! that print identically are treated as the same key.
//!
//! # Example
//!
//! ```rust
//! use tidemark_core::Time;
//! use tidemark_runtime::collection::{Collection, Dedup};
//! use tidemark_runtime::event::Event;
//!
//! let t = |ms| Time::from_millis(ms).unwrap();
//! let base: Collection<Time> = Collection::new()
//!     .add_event(Event::new(t(1)).with_field("value", 1i64), Dedup::Keep)
//!     .add_event(Event::new(t(2)).with_field("value", 2i64), Dedup::Keep);
//! let replaced = base.add_event(Event::new(t(1)).with_field("value", 9i64), Dedup::Replace);
//!
//! assert_eq!(base.size(), 2);
//! assert_eq!(replaced.size(), 2);
//! assert_eq!(replaced.sum("value", None).as_float(), Some(11.0));
//! ```

use crate::aggregation::{
    extract, sorted_numbers, split_point, AggResult, AggregateFunc, AggregateOutput, Aggregator,
    Avg, Count, Difference, First, Interpolation, Keep, Last, Max, Median, Min, Percentile,
    StdDev, Sum,
};
use crate::error::{CollectionError, CollectionResult};
use crate::event::{Event, SharedEvent};
use crate::policy::MissingPolicy;
use crate::processor::{Collapse, CollapseOptions, Pipeline, Select, SelectOptions};
use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tidemark_core::{FieldPath, FieldSpec, Key, TimeRange, Value};
use tracing::{debug, trace, warn};

/// Key string to the ascending positions of events carrying that key.
pub type KeyMap = FxHashMap<String, BTreeSet<usize>>;

/// Index rebuilds above this many events are logged.
const LARGE_REBUILD: usize = 10_000;

static NULL: Value = Value::Null;

/// Build the key index for an event list in one pass.
pub fn build_key_map<K: Key>(events: &[SharedEvent<K>]) -> KeyMap {
    if events.len() >= LARGE_REBUILD {
        debug!(events = events.len(), "rebuilding key index");
    }
    let mut key_map = KeyMap::with_capacity_and_hasher(events.len(), FxBuildHasher);
    for (position, event) in events.iter().enumerate() {
        key_map
            .entry(event.key().to_string())
            .or_default()
            .insert(position);
    }
    key_map
}

// =============================================================================
// Construction policies
// =============================================================================

/// Decides how a collection normalizes its event list.
///
/// `prepare` runs on every list a collection is built from; `on_event_added`
/// runs after a single event has been appended. Both return `true` when they
/// reordered the list, which forces the index to be rebuilt.
pub trait CollectionPolicy: Clone + fmt::Debug + Default + Send + Sync + 'static {
    fn prepare<K: Key>(events: &mut Vec<SharedEvent<K>>) -> bool;

    fn on_event_added<K: Key>(events: &mut Vec<SharedEvent<K>>) -> bool;
}

/// Keep events in insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unordered;

impl CollectionPolicy for Unordered {
    fn prepare<K: Key>(_events: &mut Vec<SharedEvent<K>>) -> bool {
        false
    }

    fn on_event_added<K: Key>(_events: &mut Vec<SharedEvent<K>>) -> bool {
        false
    }
}

/// Keep events sorted by timestamp; equal timestamps keep arrival order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chronological;

fn is_sorted_by_time<K: Key>(events: &[SharedEvent<K>]) -> bool {
    events
        .windows(2)
        .all(|pair| pair[0].timestamp() <= pair[1].timestamp())
}

impl CollectionPolicy for Chronological {
    fn prepare<K: Key>(events: &mut Vec<SharedEvent<K>>) -> bool {
        if is_sorted_by_time(events) {
            return false;
        }
        events.sort_by_key(|e| e.timestamp());
        true
    }

    fn on_event_added<K: Key>(events: &mut Vec<SharedEvent<K>>) -> bool {
        let Some(last) = events.last() else {
            return false;
        };
        let at = last.timestamp();
        let end = events.len() - 1;
        let target = events[..end].partition_point(|e| e.timestamp() <= at);
        if target == end {
            return false;
        }
        if let Some(event) = events.pop() {
            events.insert(target, event);
        }
        true
    }
}

/// A collection kept in timestamp order.
pub type SortedCollection<K> = Collection<K, Chronological>;

// =============================================================================
// Dedup
// =============================================================================

/// Conflict handling when adding an event whose key is already present.
pub enum Dedup<'a, K> {
    /// Append regardless; keys may repeat.
    Keep,
    /// Remove every event with the same key, then append the new one.
    Replace,
    /// Remove every event with the same key and append the result of
    /// merging them, oldest first, with the new event last. A merge with
    /// no result appends the new event alone.
    Merge(&'a dyn Fn(&[SharedEvent<K>]) -> Option<Event<K>>),
}

impl<K> Default for Dedup<'_, K> {
    fn default() -> Self {
        Dedup::Keep
    }
}

impl<K> Clone for Dedup<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Dedup<'_, K> {}

impl<K> fmt::Debug for Dedup<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dedup::Keep => write!(f, "Keep"),
            Dedup::Replace => write!(f, "Replace"),
            Dedup::Merge(_) => write!(f, "Merge(..)"),
        }
    }
}

// =============================================================================
// Collection
// =============================================================================

/// An immutable, ordered, keyed list of events.
#[derive(Debug, Clone)]
pub struct Collection<K: Key, P: CollectionPolicy = Unordered> {
    events: Arc<Vec<SharedEvent<K>>>,
    key_map: Arc<KeyMap>,
    policy: PhantomData<P>,
}

impl<K: Key, P: CollectionPolicy> Default for Collection<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, P: CollectionPolicy> Collection<K, P> {
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), KeyMap::default())
    }

    /// Build from an ordered sequence of events; the index is rebuilt.
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SharedEvent<K>>,
    {
        Self::build(events.into_iter().map(Into::into).collect())
    }

    /// Build from another collection, sharing its storage unless this
    /// collection's policy has to reorder the events.
    pub fn from_collection<Q: CollectionPolicy>(other: &Collection<K, Q>) -> Self {
        let mut events = other.events.as_ref().clone();
        if P::prepare(&mut events) {
            let key_map = build_key_map(&events);
            return Self::from_parts(events, key_map);
        }
        Self {
            events: Arc::clone(&other.events),
            key_map: Arc::clone(&other.key_map),
            policy: PhantomData,
        }
    }

    fn build(mut events: Vec<SharedEvent<K>>) -> Self {
        P::prepare(&mut events);
        let key_map = build_key_map(&events);
        Self::from_parts(events, key_map)
    }

    fn from_parts(events: Vec<SharedEvent<K>>, key_map: KeyMap) -> Self {
        Self {
            events: Arc::new(events),
            key_map: Arc::new(key_map),
            policy: PhantomData,
        }
    }

    /// Subset of this collection's events in their current order.
    fn subset(&self, events: Vec<SharedEvent<K>>) -> Self {
        let key_map = build_key_map(&events);
        Self::from_parts(events, key_map)
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// A new collection with `event` added, resolving key conflicts per
    /// `dedup`. After `Replace` or `Merge` exactly one event holds the key.
    pub fn add_event(&self, event: impl Into<SharedEvent<K>>, dedup: Dedup<'_, K>) -> Self {
        let event = event.into();
        let key = event.key().to_string();

        let conflicts = match dedup {
            Dedup::Keep => None,
            Dedup::Replace | Dedup::Merge(_) => self.key_map.get(&key),
        };
        let Some(positions) = conflicts else {
            return self.appended(key, event);
        };

        let replacement = match dedup {
            Dedup::Merge(merge) => {
                let mut group: Vec<SharedEvent<K>> =
                    positions.iter().map(|&i| Arc::clone(&self.events[i])).collect();
                group.push(Arc::clone(&event));
                merge(&group).map(Arc::new).unwrap_or(event)
            }
            Dedup::Keep | Dedup::Replace => event,
        };
        debug!(key = %key, conflicts = positions.len(), ?dedup, "resolved duplicate key");

        let mut events: Vec<SharedEvent<K>> = self
            .events
            .iter()
            .enumerate()
            .filter(|(i, _)| !positions.contains(i))
            .map(|(_, e)| Arc::clone(e))
            .collect();
        events.push(replacement);
        P::on_event_added(&mut events);
        self.subset(events)
    }

    fn appended(&self, key: String, event: SharedEvent<K>) -> Self {
        let mut events = self.events.as_ref().clone();
        events.push(event);
        if P::on_event_added(&mut events) {
            trace!(key = %key, "append reordered events");
            return self.subset(events);
        }
        let mut key_map = self.key_map.as_ref().clone();
        key_map.entry(key).or_default().insert(events.len() - 1);
        Self::from_parts(events, key_map)
    }

    /// Drop every event whose key string equals `key`'s.
    pub fn remove_events(&self, key: &K) -> Self {
        let Some(positions) = self.key_map.get(&key.to_string()) else {
            return self.clone();
        };
        let events = self
            .events
            .iter()
            .enumerate()
            .filter(|(i, _)| !positions.contains(i))
            .map(|(_, e)| Arc::clone(e))
            .collect();
        self.subset(events)
    }

    /// Keep only the last `n` events.
    pub fn take_last(&self, n: usize) -> Self {
        let start = self.events.len().saturating_sub(n);
        self.subset(self.events[start..].to_vec())
    }

    /// Replace the whole event list.
    pub fn set_events<I>(&self, events: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SharedEvent<K>>,
    {
        Self::from_events(events)
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events whose `path` field is present and not missing.
    pub fn size_valid(&self, path: impl Into<FieldPath>) -> usize {
        let path = path.into();
        self.events.iter().filter(|e| e.is_valid(&path)).count()
    }

    pub fn events(&self) -> &[SharedEvent<K>] {
        &self.events
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    pub fn at(&self, position: usize) -> Option<&SharedEvent<K>> {
        self.events.get(position)
    }

    /// Every event sharing `key`, in collection order.
    pub fn at_key(&self, key: &K) -> Vec<SharedEvent<K>> {
        self.key_map
            .get(&key.to_string())
            .map(|positions| {
                positions
                    .iter()
                    .map(|&i| Arc::clone(&self.events[i]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn first_event(&self) -> Option<&SharedEvent<K>> {
        self.events.first()
    }

    pub fn last_event(&self) -> Option<&SharedEvent<K>> {
        self.events.last()
    }

    /// Distinct key strings in first-seen order.
    pub fn keys(&self) -> Vec<String> {
        let keys: IndexSet<String, FxBuildHasher> =
            self.events.iter().map(|e| e.key().to_string()).collect();
        keys.into_iter().collect()
    }

    /// `(position, event)` pairs. The iterator can be cloned to restart.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &SharedEvent<K>)> + Clone + '_ {
        self.events.iter().enumerate()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SharedEvent<K>> {
        self.events.iter()
    }

    /// Call `f(event, position)` for every event; returns how many were visited.
    pub fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&SharedEvent<K>, usize),
    {
        for (position, event) in self.events.iter().enumerate() {
            f(event, position);
        }
        self.events.len()
    }

    // -------------------------------------------------------------------------
    // Transforms
    // -------------------------------------------------------------------------

    pub fn map<U, R, F>(&self, mut f: F) -> Collection<U, P>
    where
        U: Key,
        R: Into<SharedEvent<U>>,
        F: FnMut(&SharedEvent<K>) -> R,
    {
        Collection::build(self.events.iter().map(|e| f(e).into()).collect())
    }

    /// Rewrite only the keys, keeping every event's fields.
    pub fn map_keys<U, F>(&self, mut f: F) -> Collection<U, P>
    where
        U: Key,
        F: FnMut(&K) -> U,
    {
        self.map(|e| e.with_key(f(e.key())))
    }

    /// Map each event to zero or more events and flatten the result.
    pub fn flat_map<U, I, F>(&self, mut f: F) -> Collection<U, P>
    where
        U: Key,
        I: IntoIterator,
        I::Item: Into<SharedEvent<U>>,
        F: FnMut(&SharedEvent<K>) -> I,
    {
        Collection::build(
            self.events
                .iter()
                .flat_map(|e| f(e).into_iter().map(Into::into))
                .collect(),
        )
    }

    /// Stable sort by key timestamp.
    pub fn sort_by_key(&self) -> Self {
        let mut events = self.events.as_ref().clone();
        events.sort_by_key(|e| e.timestamp());
        Self::build(events)
    }

    /// Stable sort by a field value; missing values go last.
    ///
    /// A [`SortedCollection`] re-establishes timestamp order afterwards.
    pub fn sort(&self, path: impl Into<FieldPath>) -> Self {
        let path = path.into();
        let mut events = self.events.as_ref().clone();
        events.sort_by(|a, b| {
            let a = a.get_path(&path).unwrap_or(&NULL);
            let b = b.get_path(&path).unwrap_or(&NULL);
            a.sort_cmp(b)
        });
        Self::build(events)
    }

    /// Events in `[begin, end)`, clamped to the collection.
    pub fn slice(&self, begin: usize, end: usize) -> Self {
        let end = end.min(self.events.len());
        let begin = begin.min(end);
        self.subset(self.events[begin..end].to_vec())
    }

    /// Every event but the first.
    pub fn rest(&self) -> Self {
        self.slice(1, self.events.len())
    }

    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&SharedEvent<K>) -> bool,
    {
        self.subset(
            self.events
                .iter()
                .filter(|e| predicate(e))
                .cloned()
                .collect(),
        )
    }

    /// True when timestamps never decrease in collection order.
    pub fn is_chronological(&self) -> bool {
        is_sorted_by_time(&self.events)
    }

    /// Earliest begin to latest end over all events.
    pub fn timerange(&self) -> Option<TimeRange> {
        let begin = self.events.iter().map(|e| e.begin()).min()?;
        let end = self.events.iter().map(|e| e.end()).max()?;
        Some(TimeRange::new(begin, end))
    }

    // -------------------------------------------------------------------------
    // Aggregation
    // -------------------------------------------------------------------------

    /// Reduce one field to a value, or each of a list of fields to a map
    /// keyed by field path.
    pub fn aggregate(
        &self,
        func: &dyn AggregateFunc,
        spec: impl Into<FieldSpec>,
    ) -> AggregateOutput {
        match spec.into() {
            FieldSpec::Single(path) => AggregateOutput::Value(func.apply(&self.column(&path))),
            FieldSpec::List(paths) => {
                let mut fields = AggResult::with_capacity(paths.len());
                for path in &paths {
                    fields.insert(path.to_string(), func.apply(&self.column(path)));
                }
                AggregateOutput::Fields(fields)
            }
        }
    }

    /// Run several named aggregations at once.
    pub fn aggregate_all(&self, aggregator: &Aggregator) -> AggResult {
        aggregator.apply(&self.events)
    }

    fn column(&self, path: &FieldPath) -> Vec<Value> {
        extract(&self.events, path)
    }

    pub fn sum(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Sum::new(policy.unwrap_or_default()), spec)
    }

    pub fn avg(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Avg::new(policy.unwrap_or_default()), spec)
    }

    pub fn min(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Min::new(policy.unwrap_or_default()), spec)
    }

    pub fn max(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Max::new(policy.unwrap_or_default()), spec)
    }

    pub fn first(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&First::new(policy.unwrap_or_default()), spec)
    }

    pub fn last(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Last::new(policy.unwrap_or_default()), spec)
    }

    pub fn median(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Median::new(policy.unwrap_or_default()), spec)
    }

    pub fn stdev(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&StdDev::new(policy.unwrap_or_default()), spec)
    }

    pub fn count(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Count::new(policy.unwrap_or_default()), spec)
    }

    pub fn difference(
        &self,
        spec: impl Into<FieldSpec>,
        policy: Option<MissingPolicy>,
    ) -> AggregateOutput {
        self.aggregate(&Difference::new(policy.unwrap_or_default()), spec)
    }

    pub fn keep(&self, spec: impl Into<FieldSpec>, policy: Option<MissingPolicy>) -> AggregateOutput {
        self.aggregate(&Keep::new(policy.unwrap_or_default()), spec)
    }

    /// The `q`th percentile (0..=100); errors when `q` is out of range.
    pub fn percentile(
        &self,
        q: f64,
        spec: impl Into<FieldSpec>,
        interpolation: Interpolation,
        policy: Option<MissingPolicy>,
    ) -> CollectionResult<AggregateOutput> {
        let func = Percentile::new(q, interpolation, policy.unwrap_or_default())?;
        Ok(self.aggregate(&func, spec))
    }

    /// The `n - 1` values splitting `column` into `n` equal-count groups.
    ///
    /// Only numeric values take part: null, NaN and non-numeric values are
    /// dropped before sorting. Errors when `n` is zero or larger than the
    /// number of values left.
    pub fn quantile(
        &self,
        n: usize,
        column: impl Into<FieldPath>,
        interpolation: Interpolation,
    ) -> CollectionResult<Vec<f64>> {
        if n == 0 {
            warn!("rejected quantile count of zero");
            return Err(CollectionError::ZeroQuantiles);
        }
        let sorted = sorted_numbers(&self.column(&column.into()));
        let size = sorted.len();
        if n > size {
            warn!(n, size, "rejected quantile count larger than column");
            return Err(CollectionError::QuantileExceedsSize { n, size });
        }

        let last = sorted[size - 1];
        Ok((1..n)
            .map(|i| split_point(&sorted, i as f64, n as f64, interpolation).unwrap_or(last))
            .collect())
    }

    // -------------------------------------------------------------------------
    // Processors
    // -------------------------------------------------------------------------

    /// Keep only the listed fields of every event.
    pub fn select(&self, options: SelectOptions) -> Self {
        let select = Select::new(options);
        self.flat_map(|e| select.add_event(e))
    }

    /// Reduce fields within each event into a new field.
    pub fn collapse(&self, options: CollapseOptions) -> Self {
        let collapse = Collapse::new(options);
        self.flat_map(|e| collapse.add_event(e))
    }

    /// Run every processor of `pipeline` in order.
    pub fn apply_pipeline(&self, pipeline: &Pipeline) -> Self {
        pipeline
            .processors()
            .iter()
            .fold(self.clone(), |collection, processor| {
                collection.flat_map(|e| processor.add_event(e))
            })
    }
}

impl<K: Key + Serialize, P: CollectionPolicy> Collection<K, P> {
    /// Render as `{"events": [...]}`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Rendered<'a, K> {
            events: Vec<&'a Event<K>>,
        }

        serde_json::to_string(&Rendered {
            events: self.events.iter().map(|e| e.as_ref()).collect(),
        })
    }
}

impl<'a, K: Key, P: CollectionPolicy> IntoIterator for &'a Collection<K, P> {
    type Item = &'a SharedEvent<K>;
    type IntoIter = std::slice::Iter<'a, SharedEvent<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl<K: Key, P: CollectionPolicy> FromIterator<Event<K>> for Collection<K, P> {
    fn from_iter<I: IntoIterator<Item = Event<K>>>(iter: I) -> Self {
        Self::from_events(iter)
    }
}

impl<K: Key, P: CollectionPolicy> FromIterator<SharedEvent<K>> for Collection<K, P> {
    fn from_iter<I: IntoIterator<Item = SharedEvent<K>>>(iter: I) -> Self {
        Self::from_events(iter)
    }
}
