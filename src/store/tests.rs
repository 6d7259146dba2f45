//! Store Module Tests
//!
//! Exercises the in-process store through the `CoordinationStore` trait.
//!
//! ## Test Scopes
//! - **Tree**: creation, parents, sequential names, deletes.
//! - **Ephemerals**: removal on expiry and on close.
//! - **Watches**: one-shot firing, pruning of dropped handles, session loss.
//! - **Wire errors**: conversion between `StoreError` and `WireError`.

#[cfg(test)]
mod tests {
    use crate::store::error::StoreError;
    use crate::store::protocol::WireError;
    use crate::store::{CoordinationStore, InMemoryStore, SessionState, WatchEvent};
    use std::time::Duration;

    // ============================================================
    // TEST 1: Tree operations
    // ============================================================

    #[tokio::test]
    async fn test_create_with_parents_and_read_back() {
        // ARRANGE
        let store = InMemoryStore::new();
        let client = store.connect().await;

        // ACT
        client
            .create_persistent("/cluster/work/master-queue", Some(b"q".to_vec()), true)
            .await
            .unwrap();

        // ASSERT
        assert!(client.exists("/cluster").await.unwrap());
        assert!(client.exists("/cluster/work").await.unwrap());
        assert_eq!(
            client.read_data("/cluster/work/master-queue").await.unwrap(),
            b"q".to_vec()
        );

        // Creating again with parents is a no-op
        client
            .create_persistent("/cluster/work/master-queue", None, true)
            .await
            .unwrap();
        assert_eq!(
            client.read_data("/cluster/work/master-queue").await.unwrap(),
            b"q".to_vec()
        );
    }

    #[tokio::test]
    async fn test_create_without_parent_fails() {
        let store = InMemoryStore::new();
        let client = store.connect().await;

        let result = client.create_persistent("/missing/child", None, false).await;

        assert!(matches!(result, Err(StoreError::NoNode(p)) if p == "/missing"));
    }

    #[tokio::test]
    async fn test_sequential_names_increase_and_reset_with_parent() {
        // ARRANGE
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_persistent("/q", None, false).await.unwrap();

        // ACT
        let first = client
            .create_persistent_sequential("/q/operation-", vec![1])
            .await
            .unwrap();
        let second = client
            .create_persistent_sequential("/q/operation-", vec![2])
            .await
            .unwrap();

        // ASSERT
        assert_eq!(first, "/q/operation-0000000000");
        assert_eq!(second, "/q/operation-0000000001");

        // ACT: Recreate the parent
        client.delete_recursive("/q").await.unwrap();
        client.create_persistent("/q", None, false).await.unwrap();
        let again = client
            .create_persistent_sequential("/q/operation-", vec![3])
            .await
            .unwrap();

        // ASSERT: Counter starts over
        assert_eq!(again, "/q/operation-0000000000");
    }

    #[tokio::test]
    async fn test_delete_semantics() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_persistent("/a/b", None, true).await.unwrap();

        // Non-empty node cannot be deleted
        assert!(matches!(
            client.delete("/a").await,
            Err(StoreError::NotEmpty(_))
        ));

        // Deleting an absent node is quiet
        client.delete("/a/zzz").await.unwrap();

        client.delete_recursive("/a").await.unwrap();
        assert!(!client.exists("/a").await.unwrap());
        assert!(!client.exists("/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_ephemeral_cannot_have_children() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_ephemeral("/e", vec![]).await.unwrap();

        let result = client.create_persistent("/e/child", None, false).await;

        assert!(matches!(result, Err(StoreError::EphemeralParent(_))));
    }

    // ============================================================
    // TEST 2: Ephemerals and sessions
    // ============================================================

    #[tokio::test]
    async fn test_expired_session_loses_ephemerals() {
        // ARRANGE
        let store = InMemoryStore::new();
        let owner = store.connect().await;
        let observer = store.connect().await;
        owner.create_ephemeral("/live-a", b"a".to_vec()).await.unwrap();
        let mut events = owner.session_events();

        // ACT
        store.expire_session(owner.session_id()).await;

        // ASSERT
        assert!(!observer.exists("/live-a").await.unwrap());
        assert_eq!(events.recv().await.unwrap(), SessionState::Expired);
        assert!(matches!(
            owner.exists("/live-a").await,
            Err(StoreError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_renewed_session_can_recreate_ephemerals() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_ephemeral("/marker", vec![]).await.unwrap();
        let mut events = client.session_events();

        store.expire_session(client.session_id()).await;
        assert_eq!(events.recv().await.unwrap(), SessionState::Expired);

        client.renew().await;
        assert_eq!(events.recv().await.unwrap(), SessionState::NewSession);
        client.create_ephemeral("/marker", vec![]).await.unwrap();
        assert!(client.exists("/marker").await.unwrap());
    }

    #[tokio::test]
    async fn test_close_removes_ephemerals() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        let other = store.connect().await;
        client.create_ephemeral("/bye", vec![]).await.unwrap();

        client.close().await.unwrap();

        assert!(!other.exists("/bye").await.unwrap());
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnected_session_reports_connection_loss() {
        let store = InMemoryStore::new();
        let client = store.connect().await;

        store.disconnect_session(client.session_id()).await;
        let result = client.exists("/").await;
        assert!(matches!(result, Err(StoreError::ConnectionLoss(_))));

        store.reconnect_session(client.session_id()).await;
        assert!(client.exists("/").await.unwrap());
    }

    // ============================================================
    // TEST 3: Watches
    // ============================================================

    #[tokio::test]
    async fn test_child_watch_fires_once_on_create() {
        // ARRANGE
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_persistent("/w", None, false).await.unwrap();
        let watch = client.watch_children("/w").await.unwrap();
        assert!(watch.children().is_empty());

        // ACT
        client.create_persistent("/w/x", None, false).await.unwrap();

        // ASSERT
        let event = watch.changed().await.unwrap();
        assert_eq!(
            event,
            WatchEvent::ChildrenChanged {
                path: "/w".to_string()
            }
        );
        assert_eq!(store.watch_count().await, 0);
    }

    #[tokio::test]
    async fn test_data_watch_on_missing_node_fires_on_create() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        let watch = client.watch_data("/later").await.unwrap();
        assert!(watch.data().is_none());

        client.create_persistent("/later", Some(vec![7]), false).await.unwrap();

        let event = watch.changed().await.unwrap();
        assert_eq!(event.path(), Some("/later"));
    }

    #[tokio::test]
    async fn test_dropped_watch_is_pruned() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_persistent("/p", None, false).await.unwrap();

        let watch = client.watch_children("/p").await.unwrap();
        assert_eq!(store.watch_count().await, 1);

        drop(watch);
        assert_eq!(store.watch_count().await, 0);
    }

    #[tokio::test]
    async fn test_watch_fails_when_session_expires() {
        let store = InMemoryStore::new();
        let client = store.connect().await;
        client.create_persistent("/s", None, false).await.unwrap();
        let watch = client.watch_children("/s").await.unwrap();

        store.expire_session(client.session_id()).await;

        let result = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap();
        assert!(matches!(result, Err(StoreError::SessionExpired)));
    }

    // ============================================================
    // TEST 4: Wire errors
    // ============================================================

    #[test]
    fn test_wire_error_conversion_keeps_variant() {
        let original = StoreError::NoNode("/x".to_string());
        let wire = WireError::from(&original);
        assert_eq!(wire, WireError::NoNode("/x".to_string()));
        assert!(StoreError::from(wire).is_no_node());

        let expired = StoreError::from(WireError::from(&StoreError::SessionExpired));
        assert!(matches!(expired, StoreError::SessionExpired));

        let other = StoreError::from(WireError::from(&StoreError::Interrupted("x".into())));
        assert!(matches!(other, StoreError::Unexpected(_)));
    }
}
