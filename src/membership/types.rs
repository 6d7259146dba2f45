use serde::{Deserialize, Serialize};

/// Static identity of a cluster node. Stored persistently so it outlives the
/// node's connection to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
    /// Address the node serves on, e.g. `10.0.0.7:20000`.
    pub address: String,
    pub started_at_ms: u64,
}

impl NodeMetadata {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            started_at_ms: now_ms(),
        }
    }

    /// A node name unique enough for ad-hoc processes.
    pub fn generated_name() -> String {
        format!("node-{}", uuid::Uuid::new_v4().simple())
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
