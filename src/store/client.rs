//! Coordination Store Client Interface
//!
//! The narrow surface every cluster actor uses to talk to the coordination store.
//! Implementations must give single-call atomicity (create, delete, read) and
//! one-shot watches; nothing here offers multi-call transactions.
//!
//! ## Watches
//! `watch_children` / `watch_data` register a watch and return the current
//! snapshot together with a handle that resolves once, on the next change.
//! Registering and snapshotting happen atomically, so a change between the
//! snapshot and the wait cannot be lost. To keep observing, register again.
//! Dropping a handle unsubscribes it.

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use super::error::{StoreError, StoreResult};
use super::types::{SessionState, WatchEvent};

/// Pending child-set watch plus the children seen when it was registered.
#[derive(Debug)]
pub struct ChildWatch {
    children: Vec<String>,
    fired: oneshot::Receiver<WatchEvent>,
}

impl ChildWatch {
    pub fn new(children: Vec<String>, fired: oneshot::Receiver<WatchEvent>) -> Self {
        Self { children, fired }
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Waits for the watch to fire.
    ///
    /// A watch aborted by session loss resolves to the matching error.
    pub async fn changed(self) -> StoreResult<WatchEvent> {
        wait_fired(self.fired).await
    }
}

/// Pending data watch plus the data seen when it was registered.
/// `data` is `None` when the node did not exist.
#[derive(Debug)]
pub struct DataWatch {
    data: Option<Vec<u8>>,
    fired: oneshot::Receiver<WatchEvent>,
}

impl DataWatch {
    pub fn new(data: Option<Vec<u8>>, fired: oneshot::Receiver<WatchEvent>) -> Self {
        Self { data, fired }
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub async fn changed(self) -> StoreResult<WatchEvent> {
        wait_fired(self.fired).await
    }
}

async fn wait_fired(fired: oneshot::Receiver<WatchEvent>) -> StoreResult<WatchEvent> {
    match fired.await {
        Ok(WatchEvent::SessionLost { state }) => Err(StoreError::from_session_state(state)),
        Ok(event) => Ok(event),
        Err(_) => Err(StoreError::ConnectionLoss(
            "watch dropped by the store client".to_string(),
        )),
    }
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Creates a persistent node. With `create_parents`, missing ancestors are
    /// created and an already existing node is not an error.
    async fn create_persistent(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        create_parents: bool,
    ) -> StoreResult<()>;

    /// Creates a persistent node named `prefix` + store counter and returns
    /// the full path that was created.
    async fn create_persistent_sequential(&self, prefix: &str, data: Vec<u8>) -> StoreResult<String>;

    /// Creates a node bound to this client's session. Fails with
    /// `NodeExists` if the path is taken.
    async fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> StoreResult<()>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Reads node data, failing with `NoNode` if it is absent.
    async fn read_data(&self, path: &str) -> StoreResult<Vec<u8>>;

    async fn read_data_if_exists(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.read_data(path).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NoNode(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_data(&self, path: &str, data: Vec<u8>) -> StoreResult<()>;

    /// Deletes a leaf node. Deleting an absent node is not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    async fn delete_recursive(&self, path: &str) -> StoreResult<()>;

    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Registers a one-shot child watch and returns the current children.
    /// Watching a missing path is allowed; it fires when the node appears.
    async fn watch_children(&self, path: &str) -> StoreResult<ChildWatch>;

    async fn watch_data(&self, path: &str) -> StoreResult<DataWatch>;

    /// Session state transitions for this client.
    fn session_events(&self) -> broadcast::Receiver<SessionState>;

    /// Ends the session. The store removes this client's ephemerals.
    async fn close(&self) -> StoreResult<()>;
}
