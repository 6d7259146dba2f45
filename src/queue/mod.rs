//! Operation Queue Module
//!
//! The distributed work queue used for the master queue and for every
//! per-node queue.
//!
//! ## Submodules
//! - **`operation_queue`**: `OperationQueue`, enqueue / claim / results.
//! - **`claim`**: `ClaimedElement`, the handle a consumer holds while it works.
//! - **`types`**: Subtree names and the `QueuePaths` helper.

pub mod claim;
pub mod operation_queue;
pub mod types;

pub use claim::ClaimedElement;
pub use operation_queue::OperationQueue;
pub use types::QueuePaths;
