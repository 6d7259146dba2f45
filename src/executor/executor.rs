//! Operation Worker Pool
//!
//! Spawns workers that claim operations from one queue, run the registered
//! handler and publish an `OperationResult` under the operation's id.
//!
//! ## Responsibilities
//! - **Claiming**: blocking on the queue until an operation can be claimed.
//! - **Execution**: invoking the handler from the `OperationHandlerRegistry`.
//! - **Reporting**: completing the claim with a success or failure result.

use super::registry::OperationHandlerRegistry;
use crate::protocol::{Operation, OperationResult};
use crate::queue::{ClaimedElement, OperationQueue};
use crate::store::StoreError;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BASE_BACKOFF_MS: u64 = 150;
const MAX_BACKOFF_MS: u64 = 1200;

/// Drives operation execution for one node.
pub struct OperationExecutor<Op> {
    /// Name written into every published result.
    node: String,
    /// Queue the workers claim from.
    queue: OperationQueue<Op>,
    handlers: Arc<OperationHandlerRegistry<Op>>,
    worker_count: usize,
}

impl<Op: Operation> OperationExecutor<Op> {
    /// Creates a new OperationExecutor.
    ///
    /// # Arguments
    /// * `node` - Name of the node reporting the results.
    /// * `queue` - Queue holding this node's operations.
    /// * `handlers` - Registry resolving each operation's kind.
    /// * `worker_count` - Number of concurrent workers, at least one.
    pub fn new(
        node: &str,
        queue: OperationQueue<Op>,
        handlers: Arc<OperationHandlerRegistry<Op>>,
        worker_count: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            node: node.to_string(),
            queue,
            handlers,
            worker_count: worker_count.max(1),
        })
    }

    /// Spawns the workers and returns their handles. Workers stop once
    /// `shutdown` fires; an operation already claimed is finished first.
    ///
    /// # Returns
    /// One `JoinHandle` per worker, resolving after the worker stopped.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        tracing::info!(
            "Starting {} operation workers on {} for queue {}",
            self.worker_count,
            self.node,
            self.queue.root()
        );

        (0..self.worker_count)
            .map(|worker_id| {
                let executor = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    executor.worker_loop(worker_id, shutdown).await;
                })
            })
            .collect()
    }

    /// The loop of a single worker.
    ///
    /// 1. Blocks on the queue until an operation is claimed or shutdown fires.
    /// 2. Runs the claimed operation and publishes its result.
    /// 3. Backs off while the store is unreachable.
    async fn worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        tracing::info!("Worker {} started", worker_id);
        let mut failures: u32 = 0;

        loop {
            match self.queue.claim_cancellable(&shutdown).await {
                Ok(claimed) => {
                    failures = 0;
                    self.run_claimed(worker_id, claimed).await;
                }
                Err(StoreError::Interrupted(_)) => break,
                // The element stays claimed by this session and is skipped.
                Err(StoreError::Encoding(e)) => {
                    tracing::error!("Worker {} skipped an undecodable operation: {}", worker_id, e);
                }
                Err(e) if e.is_retryable() => {
                    failures += 1;
                    let delay = backoff(failures);
                    tracing::warn!(
                        "Worker {} lost the store ({}), retrying in {:?}",
                        worker_id,
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    tracing::error!("Worker {} stopped: {}", worker_id, e);
                    break;
                }
            }
        }

        tracing::info!("Worker {} stopped", worker_id);
    }

    /// Executes one claimed operation. A handler error becomes a failed
    /// result; the claim is completed either way.
    async fn run_claimed(&self, worker_id: usize, claimed: ClaimedElement<Op>) {
        let id = claimed.id().to_string();
        let Some(operation) = claimed.payload().cloned() else {
            return;
        };
        tracing::info!(
            "Worker {} claimed operation {} ({})",
            worker_id,
            id,
            operation.kind()
        );

        let result = match self.handlers.execute(&operation).await {
            Ok(()) => OperationResult::completed(&self.node),
            Err(e) => {
                tracing::warn!("Operation {} failed: {:#}", id, e);
                OperationResult::failed(&self.node, format!("{:#}", e))
            }
        };

        match claimed.complete_with_result(&result).await {
            Ok(_) => tracing::debug!("Operation {} completed", id),
            Err(e) => tracing::error!("Failed to complete operation {}: {}", id, e),
        }
    }
}

/// Capped exponential delay with a little jitter.
fn backoff(failures: u32) -> Duration {
    let exp = BASE_BACKOFF_MS.saturating_mul(1u64 << failures.min(4));
    let jitter = rand::random::<u64>() % 50;
    Duration::from_millis(exp.min(MAX_BACKOFF_MS) + jitter)
}
