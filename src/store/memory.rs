//! In-Process Coordination Store
//!
//! A complete, single-process implementation of the coordination store. It backs
//! embedded deployments (the `serve` binary exposes it over HTTP) and every test
//! that needs real store semantics.
//!
//! ## Semantics
//! - **Tree**: nodes live in a `BTreeMap` keyed by absolute path, so the
//!   children of a node are one contiguous range.
//! - **Sequential names**: one counter per parent, reset when the parent is
//!   deleted. A recreated parent hands out the same ids again.
//! - **Ephemerals**: owned by a session and removed when it ends.
//! - **Watches**: one-shot. Firing removes the registration; receivers that
//!   were dropped are pruned lazily.
//! - **Sessions**: each `MemorySession` is one client session. Tests can
//!   expire, disconnect and reconnect sessions to model store-side failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, oneshot};

use super::client::{ChildWatch, CoordinationStore, DataWatch};
use super::error::{StoreError, StoreResult};
use super::types::{
    SessionId, SessionState, WatchEvent, child_path, parent_path, sequential_name, validate_path,
};

const SESSION_EVENT_CAPACITY: usize = 64;

struct ZNode {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
}

struct Watcher {
    session: SessionId,
    tx: oneshot::Sender<WatchEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Connected,
    Disconnected,
}

struct SessionEntry {
    status: SessionStatus,
    events: broadcast::Sender<SessionState>,
}

struct StoreState {
    nodes: BTreeMap<String, ZNode>,
    sequences: HashMap<String, u64>,
    child_watches: HashMap<String, Vec<Watcher>>,
    data_watches: HashMap<String, Vec<Watcher>>,
    sessions: HashMap<SessionId, SessionEntry>,
    next_session: SessionId,
}

impl StoreState {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            ZNode {
                data: Vec::new(),
                ephemeral_owner: None,
            },
        );
        Self {
            nodes,
            sequences: HashMap::new(),
            child_watches: HashMap::new(),
            data_watches: HashMap::new(),
            sessions: HashMap::new(),
            next_session: 1,
        }
    }

    fn check_session(&self, session: SessionId) -> StoreResult<()> {
        match self.sessions.get(&session) {
            None => Err(StoreError::SessionExpired),
            Some(entry) if entry.status == SessionStatus::Disconnected => Err(
                StoreError::ConnectionLoss(format!("session {} is disconnected", session)),
            ),
            Some(_) => Ok(()),
        }
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = child_path(path, "");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| &key[prefix.len()..])
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect()
    }

    fn fire(watches: &mut HashMap<String, Vec<Watcher>>, path: &str, event: WatchEvent) {
        if let Some(watchers) = watches.remove(path) {
            for watcher in watchers {
                let _ = watcher.tx.send(event.clone());
            }
        }
    }

    fn create_node(
        &mut self,
        path: &str,
        data: Vec<u8>,
        owner: Option<SessionId>,
    ) -> StoreResult<()> {
        validate_path(path)?;
        if self.nodes.contains_key(path) {
            return Err(StoreError::NodeExists(path.to_string()));
        }
        let parent = parent_path(path).ok_or_else(|| StoreError::NodeExists(path.to_string()))?;
        match self.nodes.get(parent) {
            None => return Err(StoreError::NoNode(parent.to_string())),
            Some(node) if node.ephemeral_owner.is_some() => {
                return Err(StoreError::EphemeralParent(parent.to_string()));
            }
            Some(_) => {}
        }

        self.nodes.insert(
            path.to_string(),
            ZNode {
                data,
                ephemeral_owner: owner,
            },
        );

        let parent = parent.to_string();
        Self::fire(
            &mut self.child_watches,
            &parent,
            WatchEvent::ChildrenChanged {
                path: parent.clone(),
            },
        );
        Self::fire(
            &mut self.data_watches,
            path,
            WatchEvent::DataChanged {
                path: path.to_string(),
            },
        );
        Self::fire(
            &mut self.child_watches,
            path,
            WatchEvent::ChildrenChanged {
                path: path.to_string(),
            },
        );
        Ok(())
    }

    fn delete_node(&mut self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        if path == "/" {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        if !self.nodes.contains_key(path) {
            return Ok(false);
        }
        if !self.children_of(path).is_empty() {
            return Err(StoreError::NotEmpty(path.to_string()));
        }

        self.nodes.remove(path);
        self.sequences.remove(path);

        let deleted = WatchEvent::NodeDeleted {
            path: path.to_string(),
        };
        Self::fire(&mut self.data_watches, path, deleted.clone());
        Self::fire(&mut self.child_watches, path, deleted);
        if let Some(parent) = parent_path(path) {
            let parent = parent.to_string();
            Self::fire(
                &mut self.child_watches,
                &parent,
                WatchEvent::ChildrenChanged {
                    path: parent.clone(),
                },
            );
        }
        Ok(true)
    }

    fn register(
        watches: &mut HashMap<String, Vec<Watcher>>,
        path: &str,
        session: SessionId,
    ) -> oneshot::Receiver<WatchEvent> {
        let (tx, rx) = oneshot::channel();
        let watchers = watches.entry(path.to_string()).or_default();
        watchers.retain(|w| !w.tx.is_closed());
        watchers.push(Watcher { session, tx });
        rx
    }

    fn abort_watches(
        watches: &mut HashMap<String, Vec<Watcher>>,
        session: SessionId,
        state: SessionState,
    ) {
        for watchers in watches.values_mut() {
            let (aborted, kept): (Vec<Watcher>, Vec<Watcher>) =
                watchers.drain(..).partition(|w| w.session == session);
            *watchers = kept;
            for watcher in aborted {
                let _ = watcher.tx.send(WatchEvent::SessionLost { state });
            }
        }
        watches.retain(|_, watchers| !watchers.is_empty());
    }

    fn end_session(&mut self, session: SessionId, state: SessionState) {
        let Some(entry) = self.sessions.remove(&session) else {
            return;
        };

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            if let Err(e) = self.delete_node(&path) {
                tracing::warn!("Failed to remove ephemeral {} of session {}: {}", path, session, e);
            }
        }

        Self::abort_watches(&mut self.child_watches, session, state);
        Self::abort_watches(&mut self.data_watches, session, state);

        let _ = entry.events.send(state);
    }
}

/// Shared store state. Clients talk to it through [`MemorySession`] handles.
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StoreState::new()),
        })
    }

    /// Opens a new client session against this store.
    pub async fn connect(self: &Arc<Self>) -> Arc<MemorySession> {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let session_id = self.open_session(events.clone()).await;
        tracing::debug!("Opened in-memory session {}", session_id);
        Arc::new(MemorySession {
            store: self.clone(),
            session_id: AtomicU64::new(session_id),
            events,
        })
    }

    async fn open_session(&self, events: broadcast::Sender<SessionState>) -> SessionId {
        let mut state = self.state.lock().await;
        let session_id = state.next_session;
        state.next_session += 1;
        state.sessions.insert(
            session_id,
            SessionEntry {
                status: SessionStatus::Connected,
                events,
            },
        );
        session_id
    }

    /// Ends a session as if it had timed out: its ephemerals are removed and
    /// its pending watches fail with `SessionExpired`.
    pub async fn expire_session(&self, session: SessionId) {
        tracing::info!("Expiring session {}", session);
        self.state
            .lock()
            .await
            .end_session(session, SessionState::Expired);
    }

    /// Drops the connection of a session without ending it. Operations fail
    /// with `ConnectionLoss` until [`Self::reconnect_session`] is called.
    pub async fn disconnect_session(&self, session: SessionId) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.sessions.get_mut(&session) {
            entry.status = SessionStatus::Disconnected;
            let _ = entry.events.send(SessionState::Disconnected);
        }
    }

    pub async fn reconnect_session(&self, session: SessionId) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.sessions.get_mut(&session) {
            entry.status = SessionStatus::Connected;
            let _ = entry.events.send(SessionState::SyncConnected);
        }
    }

    pub async fn is_session_alive(&self, session: SessionId) -> bool {
        self.state.lock().await.sessions.contains_key(&session)
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of registered watches whose receiver is still alive.
    pub async fn watch_count(&self) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut count = 0;
        for watches in [&mut state.child_watches, &mut state.data_watches] {
            for watchers in watches.values_mut() {
                watchers.retain(|w| !w.tx.is_closed());
                count += watchers.len();
            }
            watches.retain(|_, watchers| !watchers.is_empty());
        }
        count
    }
}

/// One client session against an [`InMemoryStore`].
pub struct MemorySession {
    store: Arc<InMemoryStore>,
    session_id: AtomicU64,
    events: broadcast::Sender<SessionState>,
}

impl MemorySession {
    pub fn session_id(&self) -> SessionId {
        self.session_id.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Replaces an ended session with a fresh one and announces `NewSession`.
    pub async fn renew(&self) -> SessionId {
        let session_id = self.store.open_session(self.events.clone()).await;
        self.session_id.store(session_id, Ordering::SeqCst);
        let _ = self.events.send(SessionState::NewSession);
        tracing::info!("Session renewed as {}", session_id);
        session_id
    }
}

#[async_trait]
impl CoordinationStore for MemorySession {
    async fn create_persistent(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        create_parents: bool,
    ) -> StoreResult<()> {
        validate_path(path)?;
        let mut state = self.store.state.lock().await;
        state.check_session(self.session_id())?;

        if !create_parents {
            return state.create_node(path, data.unwrap_or_default(), None);
        }

        let mut ancestor = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            ancestor.push('/');
            ancestor.push_str(segment);
            if !state.nodes.contains_key(&ancestor) {
                state.create_node(&ancestor, Vec::new(), None)?;
            }
        }

        match state.create_node(path, data.unwrap_or_default(), None) {
            Ok(()) | Err(StoreError::NodeExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_persistent_sequential(&self, prefix: &str, data: Vec<u8>) -> StoreResult<String> {
        validate_path(prefix)?;
        let mut state = self.store.state.lock().await;
        state.check_session(self.session_id())?;

        let parent = parent_path(prefix)
            .ok_or_else(|| StoreError::InvalidPath(prefix.to_string()))?
            .to_string();
        if !state.nodes.contains_key(&parent) {
            return Err(StoreError::NoNode(parent));
        }

        let counter = state.sequences.entry(parent).or_insert(0);
        let path = sequential_name(prefix, *counter);
        *counter += 1;

        state.create_node(&path, data, None)?;
        Ok(path)
    }

    async fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        let session = self.session_id();
        let mut state = self.store.state.lock().await;
        state.check_session(session)?;
        state.create_node(path, data, Some(session))
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        let state = self.store.state.lock().await;
        state.check_session(self.session_id())?;
        Ok(state.nodes.contains_key(path))
    }

    async fn read_data(&self, path: &str) -> StoreResult<Vec<u8>> {
        validate_path(path)?;
        let state = self.store.state.lock().await;
        state.check_session(self.session_id())?;
        state
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| StoreError::NoNode(path.to_string()))
    }

    async fn write_data(&self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        validate_path(path)?;
        let mut state = self.store.state.lock().await;
        state.check_session(self.session_id())?;
        match state.nodes.get_mut(path) {
            Some(node) => node.data = data,
            None => return Err(StoreError::NoNode(path.to_string())),
        }
        StoreState::fire(
            &mut state.data_watches,
            path,
            WatchEvent::DataChanged {
                path: path.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let mut state = self.store.state.lock().await;
        state.check_session(self.session_id())?;
        state.delete_node(path).map(|_| ())
    }

    async fn delete_recursive(&self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        let mut state = self.store.state.lock().await;
        state.check_session(self.session_id())?;

        let prefix = child_path(path, "");
        let mut doomed: Vec<String> = state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| key.as_str() != path)
            .map(|(key, _)| key.clone())
            .collect();
        if path != "/" && state.nodes.contains_key(path) {
            doomed.push(path.to_string());
        }
        // Deepest first so every delete hits a leaf.
        doomed.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));
        for node in doomed {
            state.delete_node(&node)?;
        }
        Ok(())
    }

    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
        validate_path(path)?;
        let state = self.store.state.lock().await;
        state.check_session(self.session_id())?;
        if !state.nodes.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        Ok(state.children_of(path))
    }

    async fn watch_children(&self, path: &str) -> StoreResult<ChildWatch> {
        validate_path(path)?;
        let session = self.session_id();
        let mut state = self.store.state.lock().await;
        state.check_session(session)?;
        let children = if state.nodes.contains_key(path) {
            state.children_of(path)
        } else {
            Vec::new()
        };
        let fired = StoreState::register(&mut state.child_watches, path, session);
        Ok(ChildWatch::new(children, fired))
    }

    async fn watch_data(&self, path: &str) -> StoreResult<DataWatch> {
        validate_path(path)?;
        let session = self.session_id();
        let mut state = self.store.state.lock().await;
        state.check_session(session)?;
        let data = state.nodes.get(path).map(|node| node.data.clone());
        let fired = StoreState::register(&mut state.data_watches, path, session);
        Ok(DataWatch::new(data, fired))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }

    async fn close(&self) -> StoreResult<()> {
        let session = self.session_id();
        tracing::debug!("Closing in-memory session {}", session);
        self.store
            .state
            .lock()
            .await
            .end_session(session, SessionState::Disconnected);
        Ok(())
    }
}
