//! Path computation for the coordination tree.
//!
//! `NamespaceScheme` is pure: it never talks to the store, so any component
//! can compute a path without coordinating with anyone.

use super::types::{DEFAULT_ROOT_PATH, DEFAULT_SEPARATOR, PathDef};

const NODE_QUEUE_SUFFIX: &str = "-queue";
const ROOT_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceScheme {
    root: String,
    separator: char,
}

impl Default for NamespaceScheme {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_PATH, DEFAULT_SEPARATOR)
    }
}

impl NamespaceScheme {
    /// Builds a scheme from a configured root. The root is always a
    /// `/`-rooted store path: surrounding whitespace and trailing `/` are
    /// trimmed and a missing leading `/` is added. An empty root falls back
    /// to the default. `separator` only joins the segments below the root.
    pub fn new(root: &str, separator: char) -> Self {
        let body = root.trim().trim_end_matches(ROOT_SEPARATOR);
        let root = if body.is_empty() && root.trim().is_empty() {
            DEFAULT_ROOT_PATH.to_string()
        } else if body.starts_with(ROOT_SEPARATOR) {
            body.to_string()
        } else {
            format!("{}{}", ROOT_SEPARATOR, body)
        };
        Self { root, separator }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// `root` + the segments of `def` + `names`, joined by the separator.
    pub fn path(&self, def: PathDef, names: &[&str]) -> String {
        let mut path = if self.root.len() == ROOT_SEPARATOR.len_utf8() {
            // Root is the bare `/`; avoid doubling it.
            String::new()
        } else {
            self.root.clone()
        };
        for segment in def.segments().iter().chain(names.iter()) {
            path.push(self.separator);
            path.push_str(segment);
        }
        path
    }

    pub fn master_path(&self) -> String {
        self.path(PathDef::Master, &[])
    }

    pub fn master_queue_path(&self) -> String {
        self.path(PathDef::MasterQueue, &[])
    }

    pub fn node_queue_path(&self, node: &str) -> String {
        let queue = format!("{}{}", node, NODE_QUEUE_SUFFIX);
        self.path(PathDef::NodeQueue, &[&queue])
    }

    pub fn live_node_path(&self, node: &str) -> String {
        self.path(PathDef::NodesLive, &[node])
    }

    pub fn metadata_path(&self, node: &str) -> String {
        self.path(PathDef::NodesMetadata, &[node])
    }

    pub fn metrics_path(&self, node: &str) -> String {
        self.path(PathDef::NodeMetrics, &[node])
    }

    pub fn shard_path(&self, shard: &str) -> String {
        self.path(PathDef::ShardToNodes, &[shard])
    }

    pub fn shard_node_path(&self, shard: &str, node: &str) -> String {
        self.path(PathDef::ShardToNodes, &[shard, node])
    }

    /// Last segment of `path`.
    pub fn name_of<'a>(&self, path: &'a str) -> &'a str {
        match path.rfind(self.separator) {
            Some(idx) => &path[idx + self.separator.len_utf8()..],
            None => path,
        }
    }

    /// Paths of every persistent container, root first.
    pub fn container_paths(&self) -> Vec<String> {
        let mut paths = vec![self.root.clone()];
        paths.extend(
            PathDef::all()
                .iter()
                .filter(|def| def.is_container())
                .map(|def| self.path(*def, &[])),
        );
        paths
    }
}
