//! Operation Handler Registry
//!
//! Maps operation kinds (e.g. "deploy_shards") to async closures, so a node
//! process wires its behavior in at startup instead of the executor matching
//! on every operation variant.

use crate::protocol::Operation;

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased async handler for one operation kind.
pub type OperationHandlerFn<Op> =
    Arc<dyn Fn(Op) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry holding the mapping between operation kinds and their handlers.
pub struct OperationHandlerRegistry<Op> {
    handlers: DashMap<String, OperationHandlerFn<Op>>,
}

impl<Op: Operation> OperationHandlerRegistry<Op> {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `handler` for operations whose `kind()` is `kind`.
    /// A second registration for the same kind replaces the first.
    ///
    /// # Arguments
    /// * `kind` - The operation kind the handler serves (e.g., "deploy_shards").
    /// * `handler` - Async closure receiving an owned copy of the operation.
    pub fn register<F, Fut>(&self, kind: &str, handler: F)
    where
        F: Fn(Op) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Box::pin erases the concrete future type so all handlers share one map.
        let handler_fn: OperationHandlerFn<Op> = Arc::new(move |operation: Op| {
            Box::pin(handler(operation)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        self.handlers.insert(kind.to_string(), handler_fn);

        tracing::info!("Registered operation handler: {}", kind);
    }

    /// Runs the handler registered for the operation's kind.
    ///
    /// # Returns
    /// * `Ok(())` if the handler succeeded.
    /// * `Err` if the handler failed or no handler serves the kind.
    pub async fn execute(&self, operation: &Op) -> Result<()> {
        let kind = operation.kind();
        // Clone out of the map so no shard lock is held across the await.
        let handler_fn = self
            .handlers
            .get(kind)
            .map(|entry| entry.value().clone());

        match handler_fn {
            Some(handler_fn) => {
                tracing::debug!("Executing operation with handler '{}'", kind);
                handler_fn(operation.clone()).await
            }
            None => {
                let error = format!("Unknown operation handler: {}", kind);
                tracing::error!("{}", error);
                Err(anyhow::anyhow!(error))
            }
        }
    }

    /// Returns the kinds of all registered handlers, in no particular order.
    pub fn list_handlers(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Checks whether a handler serves `kind`.
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<Op> Default for OperationHandlerRegistry<Op> {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}
