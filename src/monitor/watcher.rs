//! Metrics Watcher
//!
//! Mirrors the `nodes/metrics` subtree into a [`MetricsSink`]. One task
//! follows the children of the metrics path; every child gets its own task
//! that re-registers a data watch after each notification and forwards the
//! decoded record.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::sink::MetricsSink;
use super::types::{MetricsRecord, OutputType};
use crate::namespace::{NamespaceScheme, PathDef};
use crate::store::types::child_path;
use crate::store::{CoordinationStore, SessionState, StoreError, StoreResult};

pub struct MetricsWatcher {
    store: Arc<dyn CoordinationStore>,
    metrics_path: String,
    sink: Arc<dyn MetricsSink>,
    subscriptions: DashMap<String, JoinHandle<()>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl MetricsWatcher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        namespace: &NamespaceScheme,
        sink: Arc<dyn MetricsSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            metrics_path: namespace.path(PathDef::NodeMetrics, &[]),
            sink,
            subscriptions: DashMap::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_output(
        store: Arc<dyn CoordinationStore>,
        namespace: &NamespaceScheme,
        output: OutputType,
    ) -> Arc<Self> {
        Self::new(store, namespace, output.sink())
    }

    /// Number of metrics nodes currently followed.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub async fn start(self: &Arc<Self>) -> StoreResult<()> {
        self.store
            .create_persistent(&self.metrics_path, None, true)
            .await?;

        let events = self.store.session_events();
        let session_task = tokio::spawn(self.clone().session_loop(events));
        let children_task = tokio::spawn(self.clone().children_loop());
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(session_task);
            tasks.push(children_task);
        }

        tracing::info!("Watching metrics under {}", self.metrics_path);
        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Waits until the store reports a terminal disconnect or `stop` is called.
    pub async fn join(&self) {
        self.shutdown.cancelled().await;

        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            let _ = task.await;
        }
        let nodes: Vec<String> = self.subscriptions.iter().map(|e| e.key().clone()).collect();
        for node in nodes {
            if let Some((_, handle)) = self.subscriptions.remove(&node) {
                let _ = handle.await;
            }
        }
        tracing::info!("Metrics watcher stopped");
    }

    async fn session_loop(self: Arc<Self>, mut events: broadcast::Receiver<SessionState>) {
        loop {
            let state = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                state = events.recv() => state,
            };
            match state {
                Ok(state) if state.is_terminal() => {
                    tracing::warn!("Store session ended ({:?}), stopping metrics watcher", state);
                    self.shutdown.cancel();
                    return;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    self.shutdown.cancel();
                    return;
                }
            }
        }
    }

    async fn children_loop(self: Arc<Self>) {
        loop {
            let watch = match self.store.watch_children(&self.metrics_path).await {
                Ok(watch) => watch,
                Err(e) => {
                    tracing::warn!("Cannot watch {}: {}", self.metrics_path, e);
                    return;
                }
            };

            for node in watch.children() {
                if !self.subscriptions.contains_key(node) {
                    tracing::debug!("Following metrics of {}", node);
                    let handle = tokio::spawn(self.clone().node_loop(node.clone()));
                    self.subscriptions.insert(node.clone(), handle);
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                fired = watch.changed() => {
                    if let Err(e) = fired {
                        tracing::warn!("Metrics child watch aborted: {}", e);
                        return;
                    }
                }
            }
        }
    }

    /// Follows one metrics node until shutdown. A deleted node is waited on
    /// until it is created again.
    async fn node_loop(self: Arc<Self>, node: String) {
        let path = child_path(&self.metrics_path, &node);
        loop {
            let watch = match self.store.watch_data(&path).await {
                Ok(watch) => watch,
                Err(e) => {
                    tracing::warn!("Cannot watch metrics of {}: {}", node, e);
                    return;
                }
            };

            if let Some(bytes) = watch.data() {
                match serde_json::from_slice::<MetricsRecord>(bytes) {
                    Ok(record) => self.sink.emit(&record),
                    Err(e) => tracing::warn!("Undecodable metrics from {}: {}", node, e),
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                fired = watch.changed() => {
                    if let Err(e) = fired {
                        tracing::debug!("Metrics watch on {} aborted: {}", node, e);
                        return;
                    }
                }
            }
        }
    }
}

/// Publishes `record` under the metrics path of its node.
pub async fn publish_metrics(
    store: &dyn CoordinationStore,
    namespace: &NamespaceScheme,
    record: &MetricsRecord,
) -> StoreResult<()> {
    let path = namespace.metrics_path(&record.node);
    let data = serde_json::to_vec(record)?;
    match store.write_data(&path, data.clone()).await {
        Err(StoreError::NoNode(_)) => store.create_persistent(&path, Some(data), true).await,
        other => other,
    }
}
