//! Store Network Protocol
//!
//! Defines the API endpoints and Data Transfer Objects (DTOs) used between a
//! `RemoteStore` client and the store server.
//!
//! Every request names the session it belongs to. Responses carry a
//! `Result<T, WireError>` body so store-level failures (missing node, expired
//! session) travel as data instead of HTTP status codes.

use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::types::{SessionId, WatchEvent};

// --- API Endpoints ---

/// Opens a new session.
pub const ENDPOINT_SESSION_OPEN: &str = "/session/open";
/// Ends a session, removing its ephemerals.
pub const ENDPOINT_SESSION_CLOSE: &str = "/session/close";
/// Long poll for watch events. Doubles as the session heartbeat.
pub const ENDPOINT_SESSION_POLL: &str = "/session/poll";
pub const ENDPOINT_NODE_CREATE: &str = "/node/create";
pub const ENDPOINT_NODE_EXISTS: &str = "/node/exists";
pub const ENDPOINT_NODE_READ: &str = "/node/read";
pub const ENDPOINT_NODE_WRITE: &str = "/node/write";
pub const ENDPOINT_NODE_DELETE: &str = "/node/delete";
pub const ENDPOINT_NODE_CHILDREN: &str = "/node/children";
pub const ENDPOINT_WATCH_CHILDREN: &str = "/watch/children";
pub const ENDPOINT_WATCH_DATA: &str = "/watch/data";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchKind {
    Children,
    Data,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenSessionRequest {
    /// Timeout the client asks for. The server may clamp it.
    pub session_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    pub session_id: SessionId,
    pub session_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollRequest {
    pub session_id: SessionId,
    /// How long the server may hold the request open when no event is pending.
    pub wait_ms: u64,
}

/// Event queued for a remote session until its next poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub kind: WatchKind,
    pub path: String,
    pub event: WatchEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollResponse {
    pub events: Vec<RemoteEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRequest {
    pub session_id: SessionId,
    pub path: String,
    pub data: Option<Vec<u8>>,
    pub mode: CreateMode,
    pub create_parents: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    /// The created path, including the generated suffix for sequential nodes.
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PathRequest {
    pub session_id: SessionId,
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    pub session_id: SessionId,
    pub path: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub session_id: SessionId,
    pub path: String,
    pub recursive: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChildrenResponse {
    pub children: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WatchDataResponse {
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {}

/// Store failure as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    NoNode(String),
    NodeExists(String),
    NotEmpty(String),
    InvalidPath(String),
    EphemeralParent(String),
    ConnectionLoss(String),
    SessionExpired,
    Failure(String),
}

pub type WireResult<T> = Result<T, WireError>;

impl From<&StoreError> for WireError {
    fn from(error: &StoreError) -> Self {
        match error {
            StoreError::NoNode(path) => WireError::NoNode(path.clone()),
            StoreError::NodeExists(path) => WireError::NodeExists(path.clone()),
            StoreError::NotEmpty(path) => WireError::NotEmpty(path.clone()),
            StoreError::InvalidPath(path) => WireError::InvalidPath(path.clone()),
            StoreError::EphemeralParent(path) => WireError::EphemeralParent(path.clone()),
            StoreError::ConnectionLoss(reason) => WireError::ConnectionLoss(reason.clone()),
            StoreError::SessionExpired => WireError::SessionExpired,
            other => WireError::Failure(other.to_string()),
        }
    }
}

impl From<WireError> for StoreError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::NoNode(path) => StoreError::NoNode(path),
            WireError::NodeExists(path) => StoreError::NodeExists(path),
            WireError::NotEmpty(path) => StoreError::NotEmpty(path),
            WireError::InvalidPath(path) => StoreError::InvalidPath(path),
            WireError::EphemeralParent(path) => StoreError::EphemeralParent(path),
            WireError::ConnectionLoss(reason) => StoreError::ConnectionLoss(reason),
            WireError::SessionExpired => StoreError::SessionExpired,
            WireError::Failure(reason) => StoreError::Unexpected(reason),
        }
    }
}
