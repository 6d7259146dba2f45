//! Cluster Coordination Library
//!
//! The control plane of a distributed search cluster. Every actor (master,
//! node, monitoring client) talks to a ZooKeeper-like coordination store
//! through the modules below; the store is the only shared state.
//!
//! ## Architecture Modules
//! - **`store`**: The coordination store itself. An in-memory implementation with
//!   sessions, ephemeral/sequential nodes and one-shot watches, its HTTP server and
//!   the HTTP client (`RemoteStore`) other processes use.
//! - **`namespace`**: The well-known path layout under a configurable root.
//! - **`queue`**: A distributed FIFO operation queue with claims and results.
//! - **`membership`**: Live-node markers, node metadata, shard announcements and
//!   master election.
//! - **`monitor`**: A watcher that mirrors per-node metrics into a sink.
//! - **`protocol`**: Typed master/node operations and the `ClusterProtocol` facade.
//! - **`executor`**: Worker pool that executes queued operations via a handler registry.
//! - **`sharding`**: Pluggable shard-key strategies.
//! - **`config`**: `CoordinationConfig`, loaded from TOML or `COORD_*` variables.

pub mod config;
pub mod executor;
pub mod membership;
pub mod monitor;
pub mod namespace;
pub mod protocol;
pub mod queue;
pub mod sharding;
pub mod store;
