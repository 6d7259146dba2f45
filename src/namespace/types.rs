use serde::{Deserialize, Serialize};

/// Default root of the coordination tree.
pub const DEFAULT_ROOT_PATH: &str = "/cluster";
pub const DEFAULT_SEPARATOR: char = '/';

const NODES: &str = "nodes";
const WORK: &str = "work";

/// Closed set of well-known locations under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathDef {
    Master,
    NodesMetadata,
    NodesLive,
    NodeMetrics,
    NodeLoadtests,
    IndicesMetadata,
    ShardToNodes,
    MasterQueue,
    NodeQueue,
}

impl PathDef {
    pub fn all() -> [PathDef; 9] {
        [
            PathDef::Master,
            PathDef::NodesMetadata,
            PathDef::NodesLive,
            PathDef::NodeMetrics,
            PathDef::NodeLoadtests,
            PathDef::IndicesMetadata,
            PathDef::ShardToNodes,
            PathDef::MasterQueue,
            PathDef::NodeQueue,
        ]
    }

    pub fn description(&self) -> &'static str {
        match self {
            PathDef::Master => "current master ephemeral",
            PathDef::NodesMetadata => "metadata of connected & unconnected nodes",
            PathDef::NodesLive => "ephemerals of connected nodes",
            PathDef::NodeMetrics => "metrics information of nodes",
            PathDef::NodeLoadtests => "loadtest information of nodes",
            PathDef::IndicesMetadata => "metadata of live & error indices",
            PathDef::ShardToNodes => "ephemerals of nodes serving a shard",
            PathDef::MasterQueue => "master operations",
            PathDef::NodeQueue => "node operations and results",
        }
    }

    pub fn segments(&self) -> &'static [&'static str] {
        match self {
            PathDef::Master => &["master"],
            PathDef::NodesMetadata => &[NODES, "metadata"],
            PathDef::NodesLive => &[NODES, "live"],
            PathDef::NodeMetrics => &[NODES, "metrics"],
            PathDef::NodeLoadtests => &[NODES, "loadtest"],
            PathDef::IndicesMetadata => &["indices"],
            PathDef::ShardToNodes => &["shard-to-nodes"],
            PathDef::MasterQueue => &[WORK, "master-queue"],
            PathDef::NodeQueue => &[WORK, "node-queues"],
        }
    }

    /// Whether the location holds persistent children that must exist before
    /// the cluster starts (everything except the master ephemeral).
    pub fn is_container(&self) -> bool {
        !matches!(self, PathDef::Master)
    }
}
