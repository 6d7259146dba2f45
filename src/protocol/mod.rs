//! Cluster Protocol Module
//!
//! What master and nodes say to each other through the store.
//!
//! ## Submodules
//! - **`operations`**: Typed master and node operations and their results.
//! - **`cluster`**: `ClusterProtocol`, the facade over queues and registry.

pub mod cluster;
pub mod operations;

pub use cluster::ClusterProtocol;
pub use operations::{
    MasterOperation, NodeOperation, Operation, OperationOutcome, OperationResult, ShardDescriptor,
};

#[cfg(test)]
mod tests;
