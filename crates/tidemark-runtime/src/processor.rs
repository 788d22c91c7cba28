//! Column processors
//!
//! Processors are stateless one-event-in, events-out transforms. A
//! collection runs them through `flat_map`, so each event is handled in
//! isolation.

use crate::aggregation::AggregateFunc;
use crate::event::{FxIndexMap, SharedEvent};
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tidemark_core::{FieldPath, FieldSpec, Key, Value};

// =============================================================================
// Select
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectOptions {
    pub fields: Vec<FieldPath>,
}

impl SelectOptions {
    pub fn new(fields: impl Into<FieldSpec>) -> Self {
        Self {
            fields: fields.into().paths().to_vec(),
        }
    }
}

/// Keeps only the listed fields of each event.
#[derive(Debug, Clone)]
pub struct Select {
    fields: Vec<FieldPath>,
}

impl Select {
    pub fn new(options: SelectOptions) -> Self {
        Self {
            fields: options.fields,
        }
    }

    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    pub fn add_event<K: Key>(&self, event: &SharedEvent<K>) -> Vec<SharedEvent<K>> {
        vec![Arc::new(event.select(&self.fields))]
    }
}

// =============================================================================
// Collapse
// =============================================================================

/// Reduce `field_spec_list` within one event into `field_name`.
#[derive(Clone)]
pub struct CollapseOptions {
    pub field_spec_list: Vec<FieldPath>,
    pub field_name: String,
    pub reducer: Arc<dyn AggregateFunc>,
    /// Keep the event's other fields alongside the new one.
    pub append: bool,
}

impl CollapseOptions {
    pub fn new(
        fields: impl Into<FieldSpec>,
        field_name: impl Into<String>,
        reducer: Arc<dyn AggregateFunc>,
        append: bool,
    ) -> Self {
        Self {
            field_spec_list: fields.into().paths().to_vec(),
            field_name: field_name.into(),
            reducer,
            append,
        }
    }
}

impl fmt::Debug for CollapseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollapseOptions")
            .field("field_spec_list", &self.field_spec_list)
            .field("field_name", &self.field_name)
            .field("reducer", &self.reducer.name())
            .field("append", &self.append)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Collapse {
    options: CollapseOptions,
}

impl Collapse {
    pub fn new(options: CollapseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CollapseOptions {
        &self.options
    }

    /// One event out. An undefined reduction is stored as null.
    pub fn add_event<K: Key>(&self, event: &SharedEvent<K>) -> Vec<SharedEvent<K>> {
        let options = &self.options;
        let values: Vec<Value> = options
            .field_spec_list
            .iter()
            .map(|path| event.get_path(path).cloned().unwrap_or(Value::Null))
            .collect();
        let reduced = options.reducer.apply(&values).unwrap_or(Value::Null);

        let data = if options.append {
            let mut data = event.data().clone();
            data.insert(options.field_name.clone(), reduced);
            data
        } else {
            let mut data: FxIndexMap<String, Value> =
                FxIndexMap::with_capacity_and_hasher(1, FxBuildHasher);
            data.insert(options.field_name.clone(), reduced);
            data
        };
        vec![Arc::new(event.set_data(data))]
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone)]
pub enum Processor {
    Select(Select),
    Collapse(Collapse),
}

impl Processor {
    pub fn name(&self) -> &'static str {
        match self {
            Processor::Select(_) => "select",
            Processor::Collapse(_) => "collapse",
        }
    }

    pub fn add_event<K: Key>(&self, event: &SharedEvent<K>) -> Vec<SharedEvent<K>> {
        match self {
            Processor::Select(select) => select.add_event(event),
            Processor::Collapse(collapse) => collapse.add_event(event),
        }
    }
}

impl From<Select> for Processor {
    fn from(select: Select) -> Self {
        Processor::Select(select)
    }
}

impl From<Collapse> for Processor {
    fn from(collapse: Collapse) -> Self {
        Processor::Collapse(collapse)
    }
}

/// Processors applied in order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    processors: Vec<Processor>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, processor: impl Into<Processor>) -> Self {
        self.processors.push(processor.into());
        self
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run one event through every stage.
    pub fn process<K: Key>(&self, event: SharedEvent<K>) -> Vec<SharedEvent<K>> {
        self.processors.iter().fold(vec![event], |events, processor| {
            events
                .iter()
                .flat_map(|e| processor.add_event(e))
                .collect()
        })
    }
}

impl FromIterator<Processor> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Processor>>(iter: I) -> Self {
        Self {
            processors: iter.into_iter().collect(),
        }
    }
}
