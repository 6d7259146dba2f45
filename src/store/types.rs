use serde::{Deserialize, Serialize};

use super::error::{StoreError, StoreResult};

/// Identifier of a client session with the coordination store.
pub type SessionId = u64;

/// Width of the zero-padded counter appended to sequential node names.
/// Fixed width keeps lexical order equal to creation order.
pub const SEQUENCE_WIDTH: usize = 10;

/// Connection state transitions delivered to session listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Connected (or reconnected) with the session still valid.
    SyncConnected,
    /// Connection dropped. Ephemerals survive until the session times out.
    Disconnected,
    /// The store gave up on the session and removed its ephemerals.
    Expired,
    /// A fresh session replaced an expired one. Ephemerals must be re-created.
    NewSession,
}

impl SessionState {
    /// States after which a long running subscriber should stop waiting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Expired)
    }
}

/// Notification delivered once by a watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEvent {
    /// A node was created under `path` or one of its children was deleted.
    ChildrenChanged { path: String },
    /// The data at `path` was written, or the node was created.
    DataChanged { path: String },
    /// The watched node itself was deleted.
    NodeDeleted { path: String },
    /// The watch was dropped because the owning session went away.
    SessionLost { state: SessionState },
}

impl WatchEvent {
    pub fn path(&self) -> Option<&str> {
        match self {
            WatchEvent::ChildrenChanged { path }
            | WatchEvent::DataChanged { path }
            | WatchEvent::NodeDeleted { path } => Some(path),
            WatchEvent::SessionLost { .. } => None,
        }
    }
}

/// Appends the store counter to a sequential node prefix.
pub fn sequential_name(prefix: &str, counter: u64) -> String {
    format!("{}{:0width$}", prefix, counter, width = SEQUENCE_WIDTH)
}

/// Last segment of a store path (`/a/b/c` -> `c`).
pub fn last_segment(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Parent of a store path, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Joins a child name onto a store path.
pub fn child_path(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Store paths are absolute, `/`-separated, without empty segments or a
/// trailing separator. The root is `/`.
pub fn validate_path(path: &str) -> StoreResult<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_name_is_zero_padded() {
        assert_eq!(sequential_name("operation-", 7), "operation-0000000007");
        assert!(sequential_name("operation-", 9) < sequential_name("operation-", 10));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(last_segment("/cluster/nodes/live/node1"), "node1");
        assert_eq!(parent_path("/cluster/nodes"), Some("/cluster"));
        assert_eq!(parent_path("/cluster"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(child_path("/", "cluster"), "/cluster");
        assert_eq!(child_path("/cluster", "work"), "/cluster/work");
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/a/b").is_ok());
        assert!(validate_path("a/b").is_err());
        assert!(validate_path("/a/").is_err());
        assert!(validate_path("/a//b").is_err());
    }
}
