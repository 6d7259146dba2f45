use thiserror::Error;

use super::types::SessionState;

/// Failures surfaced by the coordination store and the primitives built on it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no node at {0}")]
    NoNode(String),

    #[error("node already exists at {0}")]
    NodeExists(String),

    #[error("node {0} still has children")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("ephemeral node {0} cannot have children")]
    EphemeralParent(String),

    #[error("connection to coordination store lost: {0}")]
    ConnectionLoss(String),

    #[error("store operation timed out: {0}")]
    Timeout(String),

    #[error("store session expired")]
    SessionExpired,

    #[error("interrupted while waiting on {0}")]
    Interrupted(String),

    #[error("payload encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected store failure: {0}")]
    Unexpected(String),
}

impl StoreError {
    /// Failures the caller may recover from by reconnecting and retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionLoss(_) | StoreError::Timeout(_) | StoreError::SessionExpired
        )
    }

    pub fn is_no_node(&self) -> bool {
        matches!(self, StoreError::NoNode(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, StoreError::Interrupted(_))
    }

    /// Maps a session transition that aborted a pending watch to an error.
    pub fn from_session_state(state: SessionState) -> Self {
        match state {
            SessionState::Expired => StoreError::SessionExpired,
            other => StoreError::ConnectionLoss(format!("session is {:?}", other)),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
