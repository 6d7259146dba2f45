use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::NodeMetadata;
use crate::namespace::{NamespaceScheme, PathDef};
use crate::store::types::parent_path;
use crate::store::{ChildWatch, CoordinationStore, SessionState, StoreError, StoreResult};

const TRACKER_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Registers nodes in the namespace and answers who is there.
///
/// Liveness is nothing but the existence of an ephemeral marker: the store
/// removes it when the owning session dies, so no heartbeat happens here.
pub struct NodeRegistry {
    store: Arc<dyn CoordinationStore>,
    namespace: NamespaceScheme,
    /// Ephemerals created through this registry (path -> data), restored
    /// after the store hands out a new session.
    ephemerals: DashMap<String, Vec<u8>>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>, namespace: NamespaceScheme) -> Arc<Self> {
        Arc::new(Self {
            store,
            namespace,
            ephemerals: DashMap::new(),
        })
    }

    pub fn namespace(&self) -> &NamespaceScheme {
        &self.namespace
    }

    /// Records `metadata` persistently and marks the node live.
    pub async fn announce(&self, metadata: &NodeMetadata) -> StoreResult<()> {
        let data = serde_json::to_vec(metadata)?;

        // Live marker first: a name already live elsewhere must not touch
        // the other node's metadata.
        let live_path = self.namespace.live_node_path(&metadata.name);
        self.create_tracked(&live_path, data.clone()).await?;

        let metadata_path = self.namespace.metadata_path(&metadata.name);
        self.store
            .create_persistent(&metadata_path, Some(data.clone()), true)
            .await?;
        self.store.write_data(&metadata_path, data).await?;

        tracing::info!("Node {} announced at {}", metadata.name, metadata.address);
        Ok(())
    }

    /// Removes the live marker and every shard marker of `node`, and gives up
    /// the master role if this registry claimed it for `node`. Metadata stays.
    pub async fn withdraw(&self, node: &str) -> StoreResult<()> {
        let master_path = self.namespace.master_path();
        let owned: Vec<String> = self
            .ephemerals
            .iter()
            .filter(|entry| {
                if *entry.key() == master_path {
                    entry.value().as_slice() == node.as_bytes()
                } else {
                    self.namespace.name_of(entry.key()) == node
                }
            })
            .map(|entry| entry.key().clone())
            .collect();

        for path in owned {
            self.delete_tracked(&path).await?;
        }
        self.delete_tracked(&self.namespace.live_node_path(node)).await?;

        tracing::info!("Node {} withdrawn", node);
        Ok(())
    }

    pub async fn live_nodes(&self) -> StoreResult<Vec<String>> {
        self.sorted_children(&self.namespace.path(PathDef::NodesLive, &[]))
            .await
    }

    /// Every node that ever announced, connected or not.
    pub async fn known_nodes(&self) -> StoreResult<Vec<String>> {
        self.sorted_children(&self.namespace.path(PathDef::NodesMetadata, &[]))
            .await
    }

    pub async fn is_live(&self, node: &str) -> StoreResult<bool> {
        self.store.exists(&self.namespace.live_node_path(node)).await
    }

    pub async fn node_metadata(&self, node: &str) -> StoreResult<Option<NodeMetadata>> {
        match self
            .store
            .read_data_if_exists(&self.namespace.metadata_path(node))
            .await?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Current live nodes plus a one-shot watch on the live path.
    pub async fn watch_live_nodes(&self) -> StoreResult<ChildWatch> {
        let live_path = self.namespace.path(PathDef::NodesLive, &[]);
        self.store.create_persistent(&live_path, None, true).await?;
        self.store.watch_children(&live_path).await
    }

    /// Marks `node` as serving `shard`.
    pub async fn announce_shard(&self, shard: &str, node: &str) -> StoreResult<()> {
        let path = self.namespace.shard_node_path(shard, node);
        self.create_tracked(&path, node.as_bytes().to_vec()).await?;
        tracing::debug!("Node {} serves shard {}", node, shard);
        Ok(())
    }

    pub async fn withdraw_shard(&self, shard: &str, node: &str) -> StoreResult<()> {
        self.delete_tracked(&self.namespace.shard_node_path(shard, node))
            .await
    }

    pub async fn shard_nodes(&self, shard: &str) -> StoreResult<Vec<String>> {
        self.sorted_children(&self.namespace.shard_path(shard)).await
    }

    /// Tries to become master. Returns `false` if another node holds it.
    pub async fn claim_master(&self, node: &str) -> StoreResult<bool> {
        match self
            .create_tracked(&self.namespace.master_path(), node.as_bytes().to_vec())
            .await
        {
            Ok(()) => {
                tracing::info!("Node {} is now master", node);
                Ok(true)
            }
            Err(StoreError::NodeExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn current_master(&self) -> StoreResult<Option<String>> {
        Ok(self
            .store
            .read_data_if_exists(&self.namespace.master_path())
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Creates again every ephemeral this registry owns. Markers that already
    /// exist are left alone.
    pub async fn reannounce(&self) -> StoreResult<()> {
        let snapshot: Vec<(String, Vec<u8>)> = self
            .ephemerals
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (path, data) in snapshot {
            match self.create_ephemeral_with_parent(&path, data).await {
                Ok(()) | Err(StoreError::NodeExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!("Re-announced {} ephemeral(s)", self.ephemerals.len());
        Ok(())
    }

    /// Re-announces after every `NewSession` until `shutdown` fires.
    pub fn start_session_listener(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        let mut events = self.store.session_events();

        tokio::spawn(async move {
            loop {
                let state = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    state = events.recv() => state,
                };
                match state {
                    Ok(SessionState::NewSession) => {
                        if let Err(e) = registry.reannounce().await {
                            tracing::error!("Failed to re-announce after new session: {}", e);
                        }
                    }
                    Ok(state) => tracing::debug!("Registry saw session state {:?}", state),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Registry missed {} session events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Keeps a `watch` channel filled with the sorted live node list. The list
    /// is re-read after every child notification.
    pub fn spawn_live_nodes_tracker(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> (watch::Receiver<Vec<String>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(Vec::new());
        let registry = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                let live = match registry.watch_live_nodes().await {
                    Ok(live) => live,
                    Err(e) if e.is_retryable() => {
                        tracing::warn!("Live node tracker lost the store: {}", e);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(TRACKER_RETRY_DELAY) => continue,
                        }
                    }
                    Err(e) => {
                        tracing::error!("Live node tracker stopped: {}", e);
                        break;
                    }
                };

                let mut nodes = live.children().to_vec();
                nodes.sort();
                tx.send_if_modified(|current| {
                    if *current == nodes {
                        false
                    } else {
                        *current = nodes;
                        true
                    }
                });

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    fired = live.changed() => {
                        if let Err(e) = fired {
                            tracing::debug!("Live node watch aborted: {}", e);
                        }
                    }
                }
            }
        });

        (rx, handle)
    }

    async fn create_tracked(&self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        self.create_ephemeral_with_parent(path, data.clone()).await?;
        self.ephemerals.insert(path.to_string(), data);
        Ok(())
    }

    async fn create_ephemeral_with_parent(&self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        if let Some(parent) = parent_path(path) {
            self.store.create_persistent(parent, None, true).await?;
        }
        self.store.create_ephemeral(path, data).await
    }

    async fn delete_tracked(&self, path: &str) -> StoreResult<()> {
        self.ephemerals.remove(path);
        self.store.delete(path).await
    }

    async fn sorted_children(&self, path: &str) -> StoreResult<Vec<String>> {
        let mut children = match self.store.get_children(path).await {
            Ok(children) => children,
            Err(StoreError::NoNode(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        children.sort();
        Ok(children)
    }
}
