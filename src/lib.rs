//! Load-test metrics pipeline for InfluxDB 2.x.
//!
//! Collects JMeter-style sample results from a running test, turns them
//! into line-protocol points (`requests`, `virtualUsers`, `testStartEnd`
//! measurements) and streams them to an InfluxDB 2.x bucket in batches.
//!
//! Module map:
//! - `sample`: the event model handed to the pipeline
//! - `runtime`: concurrency introspection for the host running the test
//! - `pipeline`: lifecycle, filtering, tickers, point construction
//! - `point`: measurement/tag/field representation
//! - `sink`: delivery backends (InfluxDB HTTP, in-memory recording)
//! - `workload`: synthetic load driver used by the binary
//! - `config`: YAML configuration and validation

pub mod config;
pub mod pipeline;
pub mod point;
pub mod runtime;
pub mod sample;
pub mod sink;
pub mod workload;

pub use crate::pipeline::{CollectionPipeline, PipelineState};
pub use crate::point::Point;
pub use crate::runtime::{TestRuntime, TrackedRuntime};
pub use crate::sample::{SampleKind, SampleResult};
pub use crate::sink::{InfluxSink, MetricsSink, RecordingSink};
