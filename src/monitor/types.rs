use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::membership::types::now_ms;

/// Metrics a node publishes under `nodes/metrics/<node>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub node: String,
    pub timestamp_ms: u64,
    pub values: BTreeMap<String, f64>,
}

impl MetricsRecord {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            timestamp_ms: now_ms(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

/// Where the monitor writes what it sees.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    #[default]
    Log,
    Stdout,
}

impl FromStr for OutputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(OutputType::Log),
            "stdout" | "console" => Ok(OutputType::Stdout),
            other => Err(format!("unknown output type '{}'", other)),
        }
    }
}
