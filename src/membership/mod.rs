//! Membership & Discovery Module
//!
//! Tracks which nodes belong to the cluster and which of them are connected,
//! using nothing but store nodes.
//!
//! ## Core Mechanisms
//! - **Live markers**: one ephemeral per connected node under `nodes/live`.
//!   The store removes it when the node's session dies.
//! - **Metadata**: one persistent JSON record per node under `nodes/metadata`,
//!   kept after the node disconnects.
//! - **Shard markers**: ephemerals under `shard-to-nodes/<shard>` naming the
//!   nodes currently serving a shard.
//! - **Recovery**: after a new session, every marker the registry created is
//!   created again.

pub mod service;
pub mod types;

pub use service::NodeRegistry;
pub use types::NodeMetadata;
