//! Integration tests for pipeline configuration files.
//!
//! Loads YAML and TOML pipelines from disk, builds them, and runs them
//! over a collection.

use std::io::Write;
use tempfile::NamedTempFile;
use tidemark_core::{Time, Value};
use tidemark_runtime::collection::Collection;
use tidemark_runtime::config::{ConfigError, PipelineConfig};
use tidemark_runtime::event::Event;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

fn traffic() -> Collection<Time> {
    Collection::from_events(vec![
        Event::new(Time::from_millis(1).unwrap())
            .with_field("in", 2i64)
            .with_field("out", 3i64),
        Event::new(Time::from_millis(2).unwrap())
            .with_field("in", Value::Null)
            .with_field("out", 4i64),
        Event::new(Time::from_millis(3).unwrap())
            .with_field("in", 4i64)
            .with_field("out", 2i64),
    ])
}

const YAML: &str = r#"
defaults:
  policy: zero
processors:
  - type: collapse
    field_spec_list: [in, out]
    field_name: total
    reducer: sum
    append: true
  - type: collapse
    field_spec_list: [in, out]
    field_name: hi
    reducer:
      percentile:
        q: 100
    append: true
  - type: select
    fields: [total, hi]
"#;

const TOML: &str = r#"
[defaults]
policy = "propagate"

[[processors]]
type = "collapse"
field_spec_list = ["in", "out"]
field_name = "mean"
reducer = "avg"
"#;

#[test]
fn test_load_yaml_pipeline_and_run() {
    init_tracing();
    let file = write_config(".yaml", YAML);
    let pipeline = PipelineConfig::load(file.path()).unwrap().build().unwrap();

    let out = traffic().apply_pipeline(&pipeline);
    assert_eq!(out.size(), 3);
    let totals: Vec<f64> = out.iter().filter_map(|e| e.get_float("total")).collect();
    assert_eq!(totals, vec![5.0, 4.0, 6.0]);
    let highs: Vec<f64> = out.iter().filter_map(|e| e.get_float("hi")).collect();
    assert_eq!(highs, vec![3.0, 4.0, 4.0]);
    assert!(out.iter().all(|e| e.data().len() == 2));
}

#[test]
fn test_load_toml_pipeline_with_propagate_default() {
    init_tracing();
    let file = write_config(".toml", TOML);
    let pipeline = PipelineConfig::load(file.path()).unwrap().build().unwrap();

    let out = traffic().apply_pipeline(&pipeline);
    let means: Vec<Option<&Value>> = out.iter().map(|e| e.get("mean")).collect();
    assert_eq!(
        means,
        vec![
            Some(&Value::Float(2.5)),
            Some(&Value::Null),
            Some(&Value::Float(3.0))
        ]
    );
}

#[test]
fn test_unknown_extension_falls_back_to_toml() {
    let file = write_config(".conf", TOML);
    let config = PipelineConfig::load(file.path()).unwrap();
    assert_eq!(config.processors.len(), 1);
}

#[test]
fn test_invalid_file_reports_parse_error() {
    let file = write_config(".yaml", "processors: {not: [a list");
    assert!(matches!(
        PipelineConfig::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_empty_pipeline_is_identity() {
    let pipeline = PipelineConfig::default().build().unwrap();
    assert!(pipeline.is_empty());
    let source = traffic();
    let out = source.apply_pipeline(&pipeline);
    assert_eq!(out.events(), source.events());
}
