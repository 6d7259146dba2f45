//! Coordination Store Module
//!
//! The hierarchical store every cluster actor coordinates through: persistent
//! and ephemeral nodes, sequential-name allocation, one-shot watches and
//! session state notifications.
//!
//! ## Submodules
//! - **`client`**: The `CoordinationStore` trait and watch handles.
//! - **`memory`**: In-process store with sessions (embedded mode and tests).
//! - **`protocol`**: HTTP endpoints and DTOs for serving the store.
//! - **`handlers`**: Axum handlers and the session reaper of the store server.
//! - **`remote`**: HTTP client implementing `CoordinationStore` against a served store.
//! - **`types`**: Session states, watch events and path helpers.
//! - **`error`**: The `StoreError` taxonomy.

pub mod client;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod protocol;
pub mod remote;
pub mod types;

pub use client::{ChildWatch, CoordinationStore, DataWatch};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, MemorySession};
pub use types::{SessionId, SessionState, WatchEvent};

#[cfg(test)]
mod tests;
