//! Cluster Protocol Facade
//!
//! Binds a store session and a namespace into the handful of calls master and
//! node processes make: reach the master queue or a node queue, enqueue
//! operations, collect results, register nodes.

use std::sync::Arc;

use super::operations::{MasterOperation, NodeOperation, OperationResult};
use crate::membership::NodeRegistry;
use crate::monitor::{MetricsRecord, publish_metrics};
use crate::namespace::{NamespaceScheme, ensure_layout};
use crate::queue::OperationQueue;
use crate::store::{CoordinationStore, StoreResult};

pub struct ClusterProtocol {
    store: Arc<dyn CoordinationStore>,
    namespace: NamespaceScheme,
    registry: Arc<NodeRegistry>,
}

impl ClusterProtocol {
    /// Connects the facade and makes sure the namespace layout exists.
    pub async fn new(
        store: Arc<dyn CoordinationStore>,
        namespace: NamespaceScheme,
    ) -> StoreResult<Arc<Self>> {
        ensure_layout(store.as_ref(), &namespace).await?;
        let registry = NodeRegistry::new(store.clone(), namespace.clone());
        Ok(Arc::new(Self {
            store,
            namespace,
            registry,
        }))
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub fn namespace(&self) -> &NamespaceScheme {
        &self.namespace
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub async fn master_queue(&self) -> StoreResult<OperationQueue<MasterOperation>> {
        OperationQueue::new(self.store.clone(), &self.namespace.master_queue_path()).await
    }

    pub async fn node_queue(&self, node: &str) -> StoreResult<OperationQueue<NodeOperation>> {
        OperationQueue::new(self.store.clone(), &self.namespace.node_queue_path(node)).await
    }

    pub async fn add_master_operation(&self, operation: &MasterOperation) -> StoreResult<String> {
        let id = self.master_queue().await?.enqueue(operation).await?;
        tracing::info!("Added master operation {:?} as {}", operation, id);
        Ok(id)
    }

    pub async fn add_node_operation(
        &self,
        node: &str,
        operation: &NodeOperation,
    ) -> StoreResult<String> {
        let id = self.node_queue(node).await?.enqueue(operation).await?;
        tracing::info!("Added node operation {:?} for {} as {}", operation, node, id);
        Ok(id)
    }

    /// Result `node` published for operation `id`, if it has finished.
    pub async fn get_node_operation_result(
        &self,
        node: &str,
        id: &str,
        remove: bool,
    ) -> StoreResult<Option<OperationResult>> {
        self.node_queue(node).await?.get_result(id, remove).await
    }

    pub async fn get_master_operation_result(
        &self,
        id: &str,
        remove: bool,
    ) -> StoreResult<Option<OperationResult>> {
        self.master_queue().await?.get_result(id, remove).await
    }

    /// Drops the queue of a node that left the cluster for good.
    pub async fn remove_node_queue(&self, node: &str) -> StoreResult<()> {
        tracing::info!("Removing operation queue of {}", node);
        self.store
            .delete_recursive(&self.namespace.node_queue_path(node))
            .await
    }

    pub async fn publish_metrics(&self, record: &MetricsRecord) -> StoreResult<()> {
        publish_metrics(self.store.as_ref(), &self.namespace, record).await
    }
}
