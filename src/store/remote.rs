//! HTTP Store Client
//!
//! [`RemoteStore`] implements [`CoordinationStore`] against a store served by
//! [`super::handlers::StoreServer`].
//!
//! ## Responsibilities
//! - **Requests**: every store call is one HTTP POST. Idempotent calls are
//!   retried with exponential backoff and jitter; creations that allocate a
//!   name or bind to the session are sent once.
//! - **Heartbeat**: a background loop long-polls the server. Polling keeps the
//!   session alive and delivers fired watches.
//! - **Session state**: connection errors are reported as `Disconnected`, a
//!   successful poll after that as `SyncConnected`. When the server no longer
//!   knows the session, listeners get `Expired`, pending watches fail and a
//!   fresh session is opened and announced as `NewSession`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use super::client::{ChildWatch, CoordinationStore, DataWatch};
use super::error::{StoreError, StoreResult};
use super::protocol::*;
use super::types::{SessionId, SessionState, WatchEvent, validate_path};
use crate::config::CoordinationConfig;

const RETRY_ATTEMPTS: usize = 3;
const INITIAL_BACKOFF_MS: u64 = 150;
const MAX_BACKOFF_MS: u64 = 1200;
const SESSION_EVENT_CAPACITY: usize = 64;

pub struct RemoteStore {
    base_url: String,
    http_client: reqwest::Client,
    session_id: AtomicU64,
    session_timeout: Duration,
    request_timeout: Duration,
    poll_wait: Duration,
    /// Local watch registrations keyed by kind and path.
    watches: DashMap<(WatchKind, String), Vec<oneshot::Sender<WatchEvent>>>,
    events: broadcast::Sender<SessionState>,
    heartbeat: CancellationToken,
}

impl RemoteStore {
    /// Opens a session with the store at `config.store_url` and starts the
    /// heartbeat loop.
    pub async fn connect(config: &CoordinationConfig) -> StoreResult<Arc<Self>> {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let store = Arc::new(Self {
            base_url: config.store_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            session_id: AtomicU64::new(0),
            session_timeout: config.session_timeout(),
            request_timeout: config.connection_timeout(),
            poll_wait: config.poll_wait(),
            watches: DashMap::new(),
            events,
            heartbeat: CancellationToken::new(),
        });

        let session_id = store.open_session().await?;
        tracing::info!("Connected to store {} with session {}", store.base_url, session_id);

        tokio::spawn(Self::poll_loop(Arc::downgrade(&store), store.heartbeat.clone()));
        Ok(store)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id.load(Ordering::SeqCst)
    }

    /// Stops the heartbeat without closing the session, as if the process had
    /// died. The server expires the session once its timeout elapses.
    pub fn abandon(&self) {
        tracing::warn!("Abandoning session {}", self.session_id());
        self.heartbeat.cancel();
    }

    async fn open_session(&self) -> StoreResult<SessionId> {
        let request = OpenSessionRequest {
            session_timeout_ms: self.session_timeout.as_millis() as u64,
        };
        let response: OpenSessionResponse = self
            .call_with_retry(ENDPOINT_SESSION_OPEN, &request, RETRY_ATTEMPTS)
            .await?;
        self.session_id.store(response.session_id, Ordering::SeqCst);
        Ok(response.session_id)
    }

    async fn call<Req, Resp>(&self, endpoint: &str, request: &Req, timeout: Duration) -> StoreResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http_client
            .post(url)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout(format!("{}: {}", endpoint, e))
                } else {
                    StoreError::ConnectionLoss(format!("{}: {}", endpoint, e))
                }
            })?;

        let body: WireResult<Resp> = response
            .json()
            .await
            .map_err(|e| StoreError::Unexpected(format!("malformed reply from {}: {}", endpoint, e)))?;
        body.map_err(StoreError::from)
    }

    async fn call_with_retry<Req, Resp>(
        &self,
        endpoint: &str,
        request: &Req,
        attempts: usize,
    ) -> StoreResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut delay_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..attempts {
            match self.call(endpoint, request, self.request_timeout).await {
                Err(e) if e.is_retryable() && !matches!(e, StoreError::SessionExpired) => {
                    if attempt + 1 == attempts {
                        return Err(e);
                    }
                    tracing::debug!("Retrying {} after error: {}", endpoint, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
                }
                other => return other,
            }
        }

        Err(StoreError::ConnectionLoss(format!(
            "retry attempts exhausted for {}",
            endpoint
        )))
    }

    fn path_request(&self, path: &str) -> PathRequest {
        PathRequest {
            session_id: self.session_id(),
            path: path.to_string(),
        }
    }

    async fn create(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        mode: CreateMode,
        create_parents: bool,
    ) -> StoreResult<String> {
        validate_path(path)?;
        let request = CreateRequest {
            session_id: self.session_id(),
            path: path.to_string(),
            data,
            mode,
            create_parents,
        };
        // A resent sequential or ephemeral create could act twice.
        let attempts = match mode {
            CreateMode::Persistent => RETRY_ATTEMPTS,
            CreateMode::PersistentSequential | CreateMode::Ephemeral => 1,
        };
        let response: CreateResponse = self
            .call_with_retry(ENDPOINT_NODE_CREATE, &request, attempts)
            .await?;
        Ok(response.path)
    }

    fn register_watch(&self, kind: WatchKind, path: &str) -> oneshot::Receiver<WatchEvent> {
        let (tx, rx) = oneshot::channel();
        let mut senders = self.watches.entry((kind, path.to_string())).or_default();
        senders.retain(|s| !s.is_closed());
        senders.push(tx);
        rx
    }

    fn dispatch(&self, event: RemoteEvent) {
        tracing::trace!("Watch fired: {:?}", event);
        if let Some((_, senders)) = self.watches.remove(&(event.kind, event.path)) {
            for sender in senders {
                let _ = sender.send(event.event.clone());
            }
        }
    }

    fn fail_watches(&self, state: SessionState) {
        let keys: Vec<(WatchKind, String)> = self.watches.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, senders)) = self.watches.remove(&key) {
                for sender in senders {
                    let _ = sender.send(WatchEvent::SessionLost { state });
                }
            }
        }
    }

    fn announce(&self, state: SessionState) {
        tracing::info!("Session state changed: {:?}", state);
        let _ = self.events.send(state);
    }

    /// Reports the lost session and replaces it, retrying until a new one
    /// is open or the heartbeat is stopped.
    async fn recover_expired(&self, heartbeat: &CancellationToken) {
        tracing::warn!("Session {} expired on the store", self.session_id());
        self.fail_watches(SessionState::Expired);
        self.announce(SessionState::Expired);

        let mut delay_ms = INITIAL_BACKOFF_MS;
        loop {
            match self.open_session().await {
                Ok(session_id) => {
                    tracing::info!("Opened replacement session {}", session_id);
                    self.announce(SessionState::NewSession);
                    return;
                }
                Err(e) => {
                    tracing::warn!("Failed to open a new session: {}", e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::select! {
                        _ = heartbeat.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms + jitter)) => {}
                    }
                    delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
                }
            }
        }
    }

    async fn poll_loop(store: Weak<Self>, heartbeat: CancellationToken) {
        let mut connected = true;
        let mut delay_ms = INITIAL_BACKOFF_MS;

        loop {
            let Some(client) = store.upgrade() else {
                break;
            };
            let request = PollRequest {
                session_id: client.session_id(),
                wait_ms: client.poll_wait.as_millis() as u64,
            };
            let timeout = client.poll_wait + client.request_timeout;

            let result: StoreResult<PollResponse> = tokio::select! {
                _ = heartbeat.cancelled() => break,
                result = client.call(ENDPOINT_SESSION_POLL, &request, timeout) => result,
            };

            match result {
                Ok(response) => {
                    if !connected {
                        connected = true;
                        client.announce(SessionState::SyncConnected);
                    }
                    delay_ms = INITIAL_BACKOFF_MS;
                    for event in response.events {
                        client.dispatch(event);
                    }
                }
                Err(StoreError::SessionExpired) => {
                    connected = true;
                    client.recover_expired(&heartbeat).await;
                }
                Err(e) => {
                    if connected {
                        connected = false;
                        tracing::warn!("Lost connection to store {}: {}", client.base_url, e);
                        client.announce(SessionState::Disconnected);
                    }
                    drop(client);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::select! {
                        _ = heartbeat.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms + jitter)) => {}
                    }
                    delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
                }
            }
        }
        tracing::debug!("Store heartbeat stopped");
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.heartbeat.cancel();
    }
}

#[async_trait]
impl CoordinationStore for RemoteStore {
    async fn create_persistent(
        &self,
        path: &str,
        data: Option<Vec<u8>>,
        create_parents: bool,
    ) -> StoreResult<()> {
        self.create(path, data, CreateMode::Persistent, create_parents)
            .await
            .map(|_| ())
    }

    async fn create_persistent_sequential(&self, prefix: &str, data: Vec<u8>) -> StoreResult<String> {
        self.create(prefix, Some(data), CreateMode::PersistentSequential, false)
            .await
    }

    async fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        self.create(path, Some(data), CreateMode::Ephemeral, false)
            .await
            .map(|_| ())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let response: ExistsResponse = self
            .call_with_retry(ENDPOINT_NODE_EXISTS, &self.path_request(path), RETRY_ATTEMPTS)
            .await?;
        Ok(response.exists)
    }

    async fn read_data(&self, path: &str) -> StoreResult<Vec<u8>> {
        let response: ReadResponse = self
            .call_with_retry(ENDPOINT_NODE_READ, &self.path_request(path), RETRY_ATTEMPTS)
            .await?;
        Ok(response.data)
    }

    async fn write_data(&self, path: &str, data: Vec<u8>) -> StoreResult<()> {
        let request = WriteRequest {
            session_id: self.session_id(),
            path: path.to_string(),
            data,
        };
        let _: Ack = self
            .call_with_retry(ENDPOINT_NODE_WRITE, &request, RETRY_ATTEMPTS)
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let request = DeleteRequest {
            session_id: self.session_id(),
            path: path.to_string(),
            recursive: false,
        };
        let _: Ack = self
            .call_with_retry(ENDPOINT_NODE_DELETE, &request, RETRY_ATTEMPTS)
            .await?;
        Ok(())
    }

    async fn delete_recursive(&self, path: &str) -> StoreResult<()> {
        let request = DeleteRequest {
            session_id: self.session_id(),
            path: path.to_string(),
            recursive: true,
        };
        let _: Ack = self
            .call_with_retry(ENDPOINT_NODE_DELETE, &request, RETRY_ATTEMPTS)
            .await?;
        Ok(())
    }

    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
        let response: ChildrenResponse = self
            .call_with_retry(ENDPOINT_NODE_CHILDREN, &self.path_request(path), RETRY_ATTEMPTS)
            .await?;
        Ok(response.children)
    }

    async fn watch_children(&self, path: &str) -> StoreResult<ChildWatch> {
        validate_path(path)?;
        // Registered locally first so an event racing the reply still lands.
        let fired = self.register_watch(WatchKind::Children, path);
        let response: ChildrenResponse = self
            .call_with_retry(ENDPOINT_WATCH_CHILDREN, &self.path_request(path), RETRY_ATTEMPTS)
            .await?;
        Ok(ChildWatch::new(response.children, fired))
    }

    async fn watch_data(&self, path: &str) -> StoreResult<DataWatch> {
        validate_path(path)?;
        let fired = self.register_watch(WatchKind::Data, path);
        let response: WatchDataResponse = self
            .call_with_retry(ENDPOINT_WATCH_DATA, &self.path_request(path), RETRY_ATTEMPTS)
            .await?;
        Ok(DataWatch::new(response.data, fired))
    }

    fn session_events(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }

    async fn close(&self) -> StoreResult<()> {
        self.heartbeat.cancel();
        let request = SessionRequest {
            session_id: self.session_id(),
        };
        let result: StoreResult<Ack> = self
            .call(ENDPOINT_SESSION_CLOSE, &request, self.request_timeout)
            .await;
        self.fail_watches(SessionState::Disconnected);
        self.announce(SessionState::Disconnected);
        result.map(|_| ())
    }
}
