use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Anything that travels through an operation queue and is dispatched by kind.
pub trait Operation: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name the executor looks handlers up by.
    fn kind(&self) -> &'static str;
}

/// Work addressed to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MasterOperation {
    DeployIndex {
        index: String,
        location: String,
        replication_level: u32,
    },
    UndeployIndex {
        index: String,
    },
    /// Re-plan shard placement of an index after membership changed.
    BalanceIndex {
        index: String,
    },
    CheckIndices,
    RemoveObsoleteShards {
        node: String,
    },
}

impl Operation for MasterOperation {
    fn kind(&self) -> &'static str {
        match self {
            MasterOperation::DeployIndex { .. } => "deploy_index",
            MasterOperation::UndeployIndex { .. } => "undeploy_index",
            MasterOperation::BalanceIndex { .. } => "balance_index",
            MasterOperation::CheckIndices => "check_indices",
            MasterOperation::RemoveObsoleteShards { .. } => "remove_obsolete_shards",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub name: String,
    pub location: String,
}

/// Work addressed to a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeOperation {
    DeployShards {
        index: String,
        shards: Vec<ShardDescriptor>,
    },
    UndeployShards {
        index: String,
        shards: Vec<String>,
    },
    RedeployShards {
        index: String,
        shards: Vec<ShardDescriptor>,
    },
}

impl Operation for NodeOperation {
    fn kind(&self) -> &'static str {
        match self {
            NodeOperation::DeployShards { .. } => "deploy_shards",
            NodeOperation::UndeployShards { .. } => "undeploy_shards",
            NodeOperation::RedeployShards { .. } => "redeploy_shards",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    Completed,
    Failed { error: String },
}

/// Reply a node publishes for an operation it executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub node: String,
    pub outcome: OperationOutcome,
}

impl OperationResult {
    pub fn completed(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            outcome: OperationOutcome::Completed,
        }
    }

    pub fn failed(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            outcome: OperationOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OperationOutcome::Completed
    }
}
