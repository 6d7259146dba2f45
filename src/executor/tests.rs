//! Executor Module Tests
//!
//! ## Test Scopes
//! - **Registry**: Handler registration, lookup by kind and execution.
//! - **Worker pool**: Claiming from a node queue, publishing results, shutdown.

#[cfg(test)]
mod tests {
    use crate::executor::{OperationExecutor, OperationHandlerRegistry};
    use crate::protocol::{
        ClusterProtocol, NodeOperation, OperationOutcome, OperationResult, ShardDescriptor,
    };
    use crate::namespace::NamespaceScheme;
    use crate::store::{CoordinationStore, InMemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn deploy(index: &str) -> NodeOperation {
        NodeOperation::DeployShards {
            index: index.to_string(),
            shards: vec![ShardDescriptor {
                name: format!("{}#0", index),
                location: format!("/data/{}", index),
            }],
        }
    }

    fn undeploy(index: &str) -> NodeOperation {
        NodeOperation::UndeployShards {
            index: index.to_string(),
            shards: vec![format!("{}#0", index)],
        }
    }

    async fn wait_result(
        protocol: &ClusterProtocol,
        node: &str,
        id: &str,
    ) -> OperationResult {
        for _ in 0..100 {
            if let Some(result) = protocol
                .get_node_operation_result(node, id, true)
                .await
                .unwrap()
            {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no result for {}", id);
    }

    // ============================================================
    // TEST 1: OperationHandlerRegistry - Registration and Execution
    // ============================================================

    #[tokio::test]
    async fn test_registry_register_and_execute() {
        // ARRANGE: Create registry and call counter
        let registry = OperationHandlerRegistry::<NodeOperation>::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        // ACT: Register handler
        registry.register("deploy_shards", move |_operation| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        // ASSERT: Handler is registered
        assert!(registry.has_handler("deploy_shards"));
        assert_eq!(registry.handler_count(), 1);
        assert_eq!(registry.list_handlers(), vec!["deploy_shards"]);

        // ACT: Execute operation
        let result = registry.execute(&deploy("books")).await;

        // ASSERT: Handler was called
        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registry_unknown_kind_returns_error() {
        let registry = OperationHandlerRegistry::<NodeOperation>::new();

        let result = registry.execute(&undeploy("books")).await;

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown operation handler: undeploy_shards"));
    }

    #[tokio::test]
    async fn test_registry_handler_receives_operation() {
        let registry = OperationHandlerRegistry::<NodeOperation>::new();
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        registry.register("deploy_shards", move |operation| {
            let seen = seen_clone.clone();
            async move {
                if let NodeOperation::DeployShards { index, .. } = operation {
                    seen.lock().await.push(index);
                }
                Ok(())
            }
        });

        registry.execute(&deploy("books")).await.unwrap();
        registry.execute(&deploy("papers")).await.unwrap();

        assert_eq!(*seen.lock().await, vec!["books", "papers"]);
    }

    // ============================================================
    // TEST 2: OperationExecutor - Node picks up queued work
    // ============================================================

    #[tokio::test]
    async fn test_node_executes_operations_and_publishes_results() {
        // ARRANGE: A master and a node sharing one store
        let store = InMemoryStore::new();
        let master_session: Arc<dyn CoordinationStore> = store.connect().await;
        let node_session: Arc<dyn CoordinationStore> = store.connect().await;
        let master = ClusterProtocol::new(master_session, NamespaceScheme::default())
            .await
            .unwrap();
        let node = ClusterProtocol::new(node_session, NamespaceScheme::default())
            .await
            .unwrap();
        let baseline_watches = store.watch_count().await;

        let registry = OperationHandlerRegistry::<NodeOperation>::new();
        let executed = Arc::new(AtomicUsize::new(0));
        let executed_clone = executed.clone();
        registry.register("deploy_shards", move |_operation| {
            let executed = executed_clone.clone();
            async move {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        registry.register("undeploy_shards", |_operation| async {
            Err(anyhow::anyhow!("shard is busy"))
        });

        let executor = OperationExecutor::new(
            "node1",
            node.node_queue("node1").await.unwrap(),
            registry,
            1,
        );
        let shutdown = CancellationToken::new();
        let workers = executor.start(shutdown.clone());

        // ACT
        let first = master
            .add_node_operation("node1", &deploy("books"))
            .await
            .unwrap();
        let second = master
            .add_node_operation("node1", &undeploy("papers"))
            .await
            .unwrap();

        // ASSERT
        let first_result = wait_result(&master, "node1", &first).await;
        assert_eq!(first_result, OperationResult::completed("node1"));

        let second_result = wait_result(&master, "node1", &second).await;
        assert_eq!(second_result.node, "node1");
        assert!(matches!(
            second_result.outcome,
            OperationOutcome::Failed { ref error } if error.contains("shard is busy")
        ));
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert!(node.node_queue("node1").await.unwrap().is_empty().await.unwrap());

        // ACT: Shutdown while the worker waits on an empty queue
        shutdown.cancel();
        for worker in workers {
            tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .unwrap()
                .unwrap();
        }

        // ASSERT: No watch left behind
        assert_eq!(store.watch_count().await, baseline_watches);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_reported_as_failure() {
        let store = InMemoryStore::new();
        let session: Arc<dyn CoordinationStore> = store.connect().await;
        let protocol = ClusterProtocol::new(session, NamespaceScheme::default())
            .await
            .unwrap();
        let executor = OperationExecutor::new(
            "node2",
            protocol.node_queue("node2").await.unwrap(),
            OperationHandlerRegistry::new(),
            2,
        );
        let shutdown = CancellationToken::new();
        let workers = executor.start(shutdown.clone());
        assert_eq!(workers.len(), 2);

        let id = protocol
            .add_node_operation("node2", &deploy("books"))
            .await
            .unwrap();
        let result = wait_result(&protocol, "node2", &id).await;

        assert!(!result.is_success());
        shutdown.cancel();
        for worker in workers {
            worker.await.unwrap();
        }
    }
}
