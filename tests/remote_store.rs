//! HTTP store integration tests.
//!
//! Each test serves an in-memory store on an ephemeral port and talks to it
//! through `RemoteStore`, the same way separate processes would.

use cluster_coordination::config::CoordinationConfig;
use cluster_coordination::membership::{NodeMetadata, NodeRegistry};
use cluster_coordination::namespace::{NamespaceScheme, ensure_layout};
use cluster_coordination::queue::OperationQueue;
use cluster_coordination::store::handlers::StoreServer;
use cluster_coordination::store::remote::RemoteStore;
use cluster_coordination::store::{CoordinationStore, InMemoryStore, StoreError, WatchEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SESSION_TIMEOUT_MS: u64 = 500;

struct TestServer {
    config: CoordinationConfig,
    server: Arc<StoreServer>,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = CoordinationConfig {
            embedded: false,
            store_url: format!("http://{}", addr),
            bind_addr: addr.to_string(),
            session_timeout_ms: SESSION_TIMEOUT_MS,
            connection_timeout_ms: 1_000,
            poll_wait_ms: 100,
            ..CoordinationConfig::default()
        };
        config.validate().unwrap();

        let server = StoreServer::new(InMemoryStore::new(), config.session_timeout());
        let shutdown = CancellationToken::new();
        tokio::spawn(server.clone().serve(listener, shutdown.clone()));

        Self {
            config,
            server,
            shutdown,
        }
    }

    async fn client(&self) -> Arc<RemoteStore> {
        RemoteStore::connect(&self.config).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ============================================================
// TEST 1: Operation queue over HTTP
// ============================================================

#[tokio::test]
async fn test_queue_round_trip_over_http() {
    // ARRANGE: A producer and a consumer on separate sessions
    let server = TestServer::start().await;
    let producer: Arc<dyn CoordinationStore> = server.client().await;
    let consumer: Arc<dyn CoordinationStore> = server.client().await;
    let root = "/cluster/work/master-queue";

    let producer_queue = OperationQueue::<String>::new(producer, root).await.unwrap();
    let consumer_queue = OperationQueue::<String>::new(consumer, root).await.unwrap();

    // ACT
    let first = producer_queue.enqueue(&"op-A".to_string()).await.unwrap();
    let second = producer_queue.enqueue(&"op-B".to_string()).await.unwrap();

    // ASSERT: FIFO, results collected once
    assert_eq!(producer_queue.size().await.unwrap(), 2);
    assert_eq!(
        consumer_queue.dequeue_with_result(&1u32).await.unwrap(),
        "op-A"
    );
    assert_eq!(consumer_queue.dequeue().await.unwrap(), "op-B");

    assert_eq!(
        producer_queue.get_result::<u32>(&first, true).await.unwrap(),
        Some(1)
    );
    assert_eq!(
        producer_queue.get_result::<u32>(&first, true).await.unwrap(),
        None
    );
    assert_eq!(
        producer_queue.get_result::<u32>(&second, false).await.unwrap(),
        None
    );
    assert!(producer_queue.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_blocked_dequeue_wakes_on_remote_enqueue() {
    let server = TestServer::start().await;
    let producer: Arc<dyn CoordinationStore> = server.client().await;
    let consumer: Arc<dyn CoordinationStore> = server.client().await;
    let root = "/cluster/work/node-queues/node1-queue";
    let consumer_queue = OperationQueue::<String>::new(consumer, root).await.unwrap();

    let waiting = tokio::spawn(async move { consumer_queue.dequeue().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiting.is_finished());

    let producer_queue = OperationQueue::<String>::new(producer, root).await.unwrap();
    producer_queue.enqueue(&"deploy".to_string()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(received, "deploy");
}

// ============================================================
// TEST 2: Session liveness
// ============================================================

#[tokio::test]
async fn test_live_marker_vanishes_after_session_timeout() {
    // ARRANGE
    let server = TestServer::start().await;
    let namespace = NamespaceScheme::default();
    let dying = server.client().await;
    let observer: Arc<dyn CoordinationStore> = server.client().await;
    ensure_layout(observer.as_ref(), &namespace).await.unwrap();

    let dying_registry = NodeRegistry::new(dying.clone(), namespace.clone());
    let observer_registry = NodeRegistry::new(observer, namespace);
    dying_registry
        .announce(&NodeMetadata::new("node1", "127.0.0.1:7001"))
        .await
        .unwrap();
    assert!(observer_registry.is_live("node1").await.unwrap());

    // ACT: Heartbeats stop without any explicit delete
    dying.abandon();

    // ASSERT
    let mut live = true;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        live = observer_registry.is_live("node1").await.unwrap();
        if !live {
            break;
        }
    }
    assert!(!live, "live marker survived its session");
    assert_eq!(
        observer_registry.known_nodes().await.unwrap(),
        vec!["node1"]
    );
    assert_eq!(server.server.session_count(), 1);
}

#[tokio::test]
async fn test_closed_session_is_rejected() {
    let server = TestServer::start().await;
    let client = server.client().await;
    client.close().await.unwrap();

    let result = client.exists("/cluster").await;

    assert!(matches!(result, Err(StoreError::SessionExpired)));
}

// ============================================================
// TEST 3: Watches over HTTP
// ============================================================

#[tokio::test]
async fn test_remote_child_watch_fires() {
    // ARRANGE
    let server = TestServer::start().await;
    let writer = server.client().await;
    let watcher = server.client().await;
    writer
        .create_persistent("/cluster/nodes/live", None, true)
        .await
        .unwrap();

    let watch = watcher.watch_children("/cluster/nodes/live").await.unwrap();
    assert!(watch.children().is_empty());

    // ACT
    writer
        .create_ephemeral("/cluster/nodes/live/node1", Vec::new())
        .await
        .unwrap();

    // ASSERT
    let event = tokio::time::timeout(Duration::from_secs(2), watch.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, WatchEvent::ChildrenChanged { .. }));
    assert_eq!(
        watcher.get_children("/cluster/nodes/live").await.unwrap(),
        vec!["node1"]
    );
}

#[tokio::test]
async fn test_remote_data_watch_fires_on_write() {
    let server = TestServer::start().await;
    let writer = server.client().await;
    let watcher = server.client().await;
    writer
        .create_persistent("/cluster/master", Some(b"node1".to_vec()), true)
        .await
        .unwrap();

    let watch = watcher.watch_data("/cluster/master").await.unwrap();
    assert_eq!(watch.data(), Some(&b"node1"[..]));

    writer
        .write_data("/cluster/master", b"node2".to_vec())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), watch.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, WatchEvent::DataChanged { .. }));
}
