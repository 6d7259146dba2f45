//! Store Server
//!
//! Serves an [`InMemoryStore`] over HTTP so that processes on other hosts can
//! share one coordination tree.
//!
//! ## Responsibilities
//! - **Sessions**: every remote client owns one store session. A client that
//!   stops polling for longer than the session timeout is expired by the
//!   reaper, which removes its ephemerals.
//! - **Watches**: watches are registered on the client's session. When one
//!   fires, the event is queued in the session outbox until the next poll.

use axum::{Json, Router, extract::Extension, http::StatusCode, routing::post};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::client::CoordinationStore;
use super::error::{StoreError, StoreResult};
use super::memory::{InMemoryStore, MemorySession};
use super::protocol::*;
use super::types::{SessionId, SessionState, WatchEvent};

const MIN_REAPER_INTERVAL: Duration = Duration::from_millis(50);

/// Server side of one remote session.
struct RemoteSession {
    handle: Arc<MemorySession>,
    /// Milliseconds since server start of the last request.
    last_seen_ms: AtomicU64,
    outbox_tx: mpsc::UnboundedSender<RemoteEvent>,
    outbox_rx: Mutex<mpsc::UnboundedReceiver<RemoteEvent>>,
}

pub struct StoreServer {
    store: Arc<InMemoryStore>,
    sessions: DashMap<SessionId, Arc<RemoteSession>>,
    session_timeout: Duration,
    started: Instant,
}

impl StoreServer {
    pub fn new(store: Arc<InMemoryStore>, session_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            sessions: DashMap::new(),
            session_timeout,
            started: Instant::now(),
        })
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(ENDPOINT_SESSION_OPEN, post(handle_open_session))
            .route(ENDPOINT_SESSION_CLOSE, post(handle_close_session))
            .route(ENDPOINT_SESSION_POLL, post(handle_poll))
            .route(ENDPOINT_NODE_CREATE, post(handle_create))
            .route(ENDPOINT_NODE_EXISTS, post(handle_exists))
            .route(ENDPOINT_NODE_READ, post(handle_read))
            .route(ENDPOINT_NODE_WRITE, post(handle_write))
            .route(ENDPOINT_NODE_DELETE, post(handle_delete))
            .route(ENDPOINT_NODE_CHILDREN, post(handle_children))
            .route(ENDPOINT_WATCH_CHILDREN, post(handle_watch_children))
            .route(ENDPOINT_WATCH_DATA, post(handle_watch_data))
            .layer(Extension(self.clone()))
    }

    /// Runs the HTTP server and the session reaper until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: tokio::net::TcpListener,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let reaper = tokio::spawn(self.clone().reaper_loop(shutdown.clone()));
        let app = self.router();

        tracing::info!("Store server listening on {}", listener.local_addr()?);
        let token = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        shutdown.cancel();
        let _ = reaper.await;
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn open_session(&self) -> SessionId {
        let handle = self.store.connect().await;
        let session_id = handle.session_id();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        self.sessions.insert(
            session_id,
            Arc::new(RemoteSession {
                handle,
                last_seen_ms: AtomicU64::new(self.now_ms()),
                outbox_tx,
                outbox_rx: Mutex::new(outbox_rx),
            }),
        );
        tracing::info!("Opened remote session {}", session_id);
        session_id
    }

    /// Looks a session up and records the request as a heartbeat.
    fn touch(&self, session_id: SessionId) -> StoreResult<Arc<RemoteSession>> {
        let session = self
            .sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::SessionExpired)?;
        session.last_seen_ms.store(self.now_ms(), Ordering::SeqCst);
        Ok(session)
    }

    async fn reaper_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval((self.session_timeout / 4).max(MIN_REAPER_INTERVAL));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.reap_expired().await;
        }
        tracing::debug!("Session reaper stopped");
    }

    /// Expires every session that has been silent for longer than the timeout.
    pub async fn reap_expired(&self) {
        let now = self.now_ms();
        let timeout_ms = self.session_timeout.as_millis() as u64;

        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                now.saturating_sub(entry.value().last_seen_ms.load(Ordering::SeqCst)) > timeout_ms
            })
            .map(|entry| *entry.key())
            .collect();

        for session_id in expired {
            self.sessions.remove(&session_id);
            tracing::warn!(
                "Session {} expired (no contact for more than {:?})",
                session_id,
                self.session_timeout
            );
            self.store.expire_session(session_id).await;
        }
    }
}

fn reply<T>(result: StoreResult<T>) -> (StatusCode, Json<WireResult<T>>) {
    match result {
        Ok(value) => (StatusCode::OK, Json(Ok(value))),
        Err(e) => {
            let status = match &e {
                StoreError::SessionExpired => StatusCode::GONE,
                StoreError::Unexpected(_) | StoreError::Encoding(_) | StoreError::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::OK,
            };
            if status != StatusCode::OK {
                tracing::debug!("Store request failed: {}", e);
            }
            (status, Json(Err(WireError::from(&e))))
        }
    }
}

fn forward_watch(
    session: &RemoteSession,
    kind: WatchKind,
    path: String,
    fired: impl std::future::Future<Output = StoreResult<WatchEvent>> + Send + 'static,
) {
    let outbox = session.outbox_tx.clone();
    tokio::spawn(async move {
        let event = match fired.await {
            Ok(event) => event,
            Err(StoreError::SessionExpired) => WatchEvent::SessionLost {
                state: SessionState::Expired,
            },
            Err(_) => WatchEvent::SessionLost {
                state: SessionState::Disconnected,
            },
        };
        let _ = outbox.send(RemoteEvent { kind, path, event });
    });
}

pub async fn handle_open_session(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(_req): Json<OpenSessionRequest>,
) -> (StatusCode, Json<WireResult<OpenSessionResponse>>) {
    let session_id = server.open_session().await;
    reply(Ok(OpenSessionResponse {
        session_id,
        session_timeout_ms: server.session_timeout.as_millis() as u64,
    }))
}

pub async fn handle_close_session(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<SessionRequest>,
) -> (StatusCode, Json<WireResult<Ack>>) {
    let result = match server.sessions.remove(&req.session_id) {
        Some((_, session)) => {
            tracing::info!("Closing remote session {}", req.session_id);
            session.handle.close().await.map(|_| Ack {})
        }
        None => Ok(Ack {}),
    };
    reply(result)
}

pub async fn handle_poll(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<PollRequest>,
) -> (StatusCode, Json<WireResult<PollResponse>>) {
    let session = match server.touch(req.session_id) {
        Ok(session) => session,
        Err(e) => return reply(Err(e)),
    };
    // Never hold a poll long enough for the session to time out meanwhile.
    let wait = Duration::from_millis(req.wait_ms).min(server.session_timeout / 3);

    let mut events = Vec::new();
    {
        let mut outbox = session.outbox_rx.lock().await;
        if let Ok(Some(event)) = tokio::time::timeout(wait, outbox.recv()).await {
            events.push(event);
        }
        while let Ok(event) = outbox.try_recv() {
            events.push(event);
        }
    }

    let _ = server.touch(req.session_id);
    reply(Ok(PollResponse { events }))
}

pub async fn handle_create(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<CreateRequest>,
) -> (StatusCode, Json<WireResult<CreateResponse>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        let store = &session.handle;
        let data = req.data;
        let path = match req.mode {
            CreateMode::Persistent => {
                store
                    .create_persistent(&req.path, data, req.create_parents)
                    .await?;
                req.path
            }
            CreateMode::PersistentSequential => {
                store
                    .create_persistent_sequential(&req.path, data.unwrap_or_default())
                    .await?
            }
            CreateMode::Ephemeral => {
                store
                    .create_ephemeral(&req.path, data.unwrap_or_default())
                    .await?;
                req.path
            }
        };
        Ok::<_, StoreError>(CreateResponse { path })
    }
    .await;
    reply(result)
}

pub async fn handle_exists(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<PathRequest>,
) -> (StatusCode, Json<WireResult<ExistsResponse>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        let exists = session.handle.exists(&req.path).await?;
        Ok::<_, StoreError>(ExistsResponse { exists })
    }
    .await;
    reply(result)
}

pub async fn handle_read(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<PathRequest>,
) -> (StatusCode, Json<WireResult<ReadResponse>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        let data = session.handle.read_data(&req.path).await?;
        Ok::<_, StoreError>(ReadResponse { data })
    }
    .await;
    reply(result)
}

pub async fn handle_write(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<WriteRequest>,
) -> (StatusCode, Json<WireResult<Ack>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        session.handle.write_data(&req.path, req.data).await?;
        Ok::<_, StoreError>(Ack {})
    }
    .await;
    reply(result)
}

pub async fn handle_delete(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<DeleteRequest>,
) -> (StatusCode, Json<WireResult<Ack>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        if req.recursive {
            session.handle.delete_recursive(&req.path).await?;
        } else {
            session.handle.delete(&req.path).await?;
        }
        Ok::<_, StoreError>(Ack {})
    }
    .await;
    reply(result)
}

pub async fn handle_children(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<PathRequest>,
) -> (StatusCode, Json<WireResult<ChildrenResponse>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        let children = session.handle.get_children(&req.path).await?;
        Ok::<_, StoreError>(ChildrenResponse { children })
    }
    .await;
    reply(result)
}

pub async fn handle_watch_children(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<PathRequest>,
) -> (StatusCode, Json<WireResult<ChildrenResponse>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        let watch = session.handle.watch_children(&req.path).await?;
        let children = watch.children().to_vec();
        forward_watch(&session, WatchKind::Children, req.path, watch.changed());
        Ok::<_, StoreError>(ChildrenResponse { children })
    }
    .await;
    reply(result)
}

pub async fn handle_watch_data(
    Extension(server): Extension<Arc<StoreServer>>,
    Json(req): Json<PathRequest>,
) -> (StatusCode, Json<WireResult<WatchDataResponse>>) {
    let result = async move {
        let session = server.touch(req.session_id)?;
        let watch = session.handle.watch_data(&req.path).await?;
        let data = watch.data().map(|d| d.to_vec());
        forward_watch(&session, WatchKind::Data, req.path, watch.changed());
        Ok::<_, StoreError>(WatchDataResponse { data })
    }
    .await;
    reply(result)
}
