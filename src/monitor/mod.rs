//! Monitoring Module
//!
//! A long lived observer of the metrics nodes publish into the store.
//!
//! ## Submodules
//! - **`watcher`**: `MetricsWatcher` and the `publish_metrics` helper.
//! - **`sink`**: Output targets for observed records.
//! - **`types`**: `MetricsRecord` and `OutputType`.

pub mod sink;
pub mod types;
pub mod watcher;

pub use sink::{ChannelSink, LogSink, MetricsSink, StdoutSink};
pub use types::{MetricsRecord, OutputType};
pub use watcher::{MetricsWatcher, publish_metrics};
