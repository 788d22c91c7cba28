//! Tidemark Runtime - immutable keyed event collections and their reducers
//!
//! This crate provides the [`Collection`] container, the reducer family in
//! [`aggregation`], missing-value policies, and the Select/Collapse column
//! processors that can be declared in a pipeline configuration file.

pub mod aggregation;
pub mod collection;
pub mod config;
pub mod error;
pub mod event;
pub mod policy;
pub mod processor;

pub use aggregation::{
    AggResult, AggregateFunc, AggregateOutput, Aggregator, Avg, Count, Difference, First,
    Interpolation, Keep, Last, Max, Median, Min, Percentile, StdDev, Sum,
};
pub use collection::{
    build_key_map, Chronological, Collection, CollectionPolicy, Dedup, KeyMap, SortedCollection,
    Unordered,
};
pub use config::{ConfigError, PipelineConfig, ProcessorConfig, ReducerSpec};
pub use error::{CollectionError, CollectionResult};
pub use event::{Event, FxIndexMap, SharedEvent};
pub use policy::MissingPolicy;
pub use processor::{Collapse, CollapseOptions, Pipeline, Processor, Select, SelectOptions};
