#[cfg(test)]
mod tests {
    use crate::protocol::{
        ClusterProtocol, MasterOperation, NodeOperation, Operation, OperationResult, ShardDescriptor,
    };
    use crate::namespace::NamespaceScheme;
    use crate::store::{CoordinationStore, InMemoryStore};
    use std::sync::Arc;

    fn deploy(index: &str) -> NodeOperation {
        NodeOperation::DeployShards {
            index: index.to_string(),
            shards: vec![ShardDescriptor {
                name: format!("{}#0", index),
                location: format!("/data/{}/0", index),
            }],
        }
    }

    #[test]
    fn test_operation_kinds() {
        assert_eq!(deploy("books").kind(), "deploy_shards");
        assert_eq!(MasterOperation::CheckIndices.kind(), "check_indices");
        assert_eq!(
            MasterOperation::UndeployIndex {
                index: "x".to_string()
            }
            .kind(),
            "undeploy_index"
        );
    }

    #[tokio::test]
    async fn test_node_operation_round_trip_with_result() {
        // ARRANGE
        let store = InMemoryStore::new();
        let master_store: Arc<dyn CoordinationStore> = store.connect().await;
        let node_store: Arc<dyn CoordinationStore> = store.connect().await;
        let master = ClusterProtocol::new(master_store, NamespaceScheme::default())
            .await
            .unwrap();
        let node = ClusterProtocol::new(node_store, NamespaceScheme::default())
            .await
            .unwrap();

        // ACT: Master hands work to node1, node1 executes and replies
        let id = master
            .add_node_operation("node1", &deploy("books"))
            .await
            .unwrap();
        assert!(master
            .get_node_operation_result("node1", &id, false)
            .await
            .unwrap()
            .is_none());

        let queue = node.node_queue("node1").await.unwrap();
        let operation = queue
            .dequeue_with_result(&OperationResult::completed("node1"))
            .await
            .unwrap();

        // ASSERT
        assert_eq!(operation, deploy("books"));
        let result = master
            .get_node_operation_result("node1", &id, true)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.node, "node1");
        assert!(master
            .get_node_operation_result("node1", &id, true)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_queues_live_under_namespace() {
        let store = InMemoryStore::new();
        let session: Arc<dyn CoordinationStore> = store.connect().await;
        let protocol = ClusterProtocol::new(session.clone(), NamespaceScheme::default())
            .await
            .unwrap();

        protocol
            .add_master_operation(&MasterOperation::CheckIndices)
            .await
            .unwrap();
        protocol.node_queue("node7").await.unwrap();

        assert_eq!(
            session
                .get_children("/cluster/work/master-queue/operations")
                .await
                .unwrap(),
            vec!["operation-0000000000"]
        );
        assert!(session
            .exists("/cluster/work/node-queues/node7-queue/results")
            .await
            .unwrap());

        protocol.remove_node_queue("node7").await.unwrap();
        assert!(!session
            .exists("/cluster/work/node-queues/node7-queue")
            .await
            .unwrap());
    }
}
