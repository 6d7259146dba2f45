use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{MetricsRecord, OutputType};

pub trait MetricsSink: Send + Sync {
    fn emit(&self, record: &MetricsRecord);
}

/// Writes records through `tracing`.
pub struct LogSink;

impl MetricsSink for LogSink {
    fn emit(&self, record: &MetricsRecord) {
        tracing::info!(
            "Metrics from {} at {}: {:?}",
            record.node,
            record.timestamp_ms,
            record.values
        );
    }
}

/// Prints one line per record.
pub struct StdoutSink;

impl MetricsSink for StdoutSink {
    fn emit(&self, record: &MetricsRecord) {
        let values: Vec<String> = record
            .values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        println!("{} {} {}", record.timestamp_ms, record.node, values.join(" "));
    }
}

/// Forwards records into a channel, for embedding the monitor in another
/// component.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MetricsRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MetricsRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MetricsSink for ChannelSink {
    fn emit(&self, record: &MetricsRecord) {
        if self.tx.send(record.clone()).is_err() {
            tracing::debug!("Metrics receiver gone, dropping record from {}", record.node);
        }
    }
}

impl OutputType {
    pub fn sink(&self) -> Arc<dyn MetricsSink> {
        match self {
            OutputType::Log => Arc::new(LogSink),
            OutputType::Stdout => Arc::new(StdoutSink),
        }
    }
}
