//! Pipeline configuration files
//!
//! Supports both YAML and TOML configuration files.
//!
//! # Example YAML configuration:
//! ```yaml
//! # Policy and interpolation used when a processor does not name its own
//! defaults:
//!   policy: ignore
//!   interpolation: linear
//!
//! processors:
//!   - type: collapse
//!     field_spec_list: [in, out]
//!     field_name: total
//!     reducer: sum
//!     append: true
//!   - type: collapse
//!     field_spec_list: [in, out]
//!     field_name: p90
//!     reducer:
//!       percentile:
//!         q: 90
//!   - type: select
//!     fields: [total, p90]
//! ```

use crate::aggregation::{
    AggregateFunc, Avg, Count, Difference, First, Interpolation, Keep, Last, Max, Median, Min,
    Percentile, StdDev, Sum,
};
use crate::error::CollectionError;
use crate::policy::MissingPolicy;
use crate::processor::{Collapse, CollapseOptions, Pipeline, Processor, Select, SelectOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidemark_core::FieldPath;
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fallbacks for processors that leave policy or interpolation unset
    pub defaults: DefaultsConfig,

    /// Processors, applied in order
    pub processors: Vec<ProcessorConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub policy: MissingPolicy,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    Select {
        fields: Vec<FieldPath>,
    },
    Collapse {
        field_spec_list: Vec<FieldPath>,
        field_name: String,
        reducer: ReducerSpec,
        #[serde(default)]
        append: bool,
        #[serde(default)]
        policy: Option<MissingPolicy>,
    },
}

/// A reducer named in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReducerSpec {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    First,
    Last,
    Median,
    Stdev,
    Difference,
    Keep,
    Percentile {
        q: f64,
        #[serde(default)]
        interpolation: Option<Interpolation>,
    },
}

impl ReducerSpec {
    pub fn build(
        &self,
        policy: MissingPolicy,
        interpolation: Interpolation,
    ) -> Result<Arc<dyn AggregateFunc>, ConfigError> {
        let func: Arc<dyn AggregateFunc> = match self {
            ReducerSpec::Sum => Arc::new(Sum::new(policy)),
            ReducerSpec::Avg => Arc::new(Avg::new(policy)),
            ReducerSpec::Min => Arc::new(Min::new(policy)),
            ReducerSpec::Max => Arc::new(Max::new(policy)),
            ReducerSpec::Count => Arc::new(Count::new(policy)),
            ReducerSpec::First => Arc::new(First::new(policy)),
            ReducerSpec::Last => Arc::new(Last::new(policy)),
            ReducerSpec::Median => Arc::new(Median::new(policy)),
            ReducerSpec::Stdev => Arc::new(StdDev::new(policy)),
            ReducerSpec::Difference => Arc::new(Difference::new(policy)),
            ReducerSpec::Keep => Arc::new(Keep::new(policy)),
            ReducerSpec::Percentile {
                q,
                interpolation: own,
            } => Arc::new(Percentile::new(
                *q,
                own.unwrap_or(interpolation),
                policy,
            )?),
        };
        Ok(func)
    }
}

impl ProcessorConfig {
    pub fn build(&self, defaults: &DefaultsConfig) -> Result<Processor, ConfigError> {
        match self {
            ProcessorConfig::Select { fields } => Ok(Processor::Select(Select::new(
                SelectOptions {
                    fields: fields.clone(),
                },
            ))),
            ProcessorConfig::Collapse {
                field_spec_list,
                field_name,
                reducer,
                append,
                policy,
            } => {
                let reducer =
                    reducer.build(policy.unwrap_or(defaults.policy), defaults.interpolation)?;
                Ok(Processor::Collapse(Collapse::new(CollapseOptions {
                    field_spec_list: field_spec_list.clone(),
                    field_name: field_name.clone(),
                    reducer,
                    append: *append,
                })))
            }
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a file (auto-detects YAML or TOML)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }?;
        debug!(
            path = %path.display(),
            processors = config.processors.len(),
            "loaded pipeline config"
        );
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Instantiate every processor.
    pub fn build(&self) -> Result<Pipeline, ConfigError> {
        self.processors
            .iter()
            .map(|p| p.build(&self.defaults))
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid reducer: {0}")]
    InvalidReducer(#[from] CollectionError),
}
