//! Operation Executor Module
//!
//! Runs the operations a process finds in its queue.
//!
//! ## Submodules
//! - **`registry`**: Maps operation kinds to async handlers.
//! - **`executor`**: Worker pool that claims, executes and reports results.

pub mod executor;
pub mod registry;

pub use executor::OperationExecutor;
pub use registry::OperationHandlerRegistry;

#[cfg(test)]
mod tests;
