use crate::store::types::child_path;

/// Subtree holding the queued elements.
pub const ELEMENTS_DIR: &str = "operations";
/// Subtree holding ephemeral results, keyed by element id.
pub const RESULTS_DIR: &str = "results";
/// Subtree holding ephemeral claim markers, keyed by element id.
pub const CLAIMS_DIR: &str = "claims";
/// Name prefix of every element; the store appends the sequence counter.
pub const ELEMENT_PREFIX: &str = "operation-";

/// Paths of one queue root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePaths {
    pub root: String,
    pub elements: String,
    pub results: String,
    pub claims: String,
}

impl QueuePaths {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            elements: child_path(root, ELEMENTS_DIR),
            results: child_path(root, RESULTS_DIR),
            claims: child_path(root, CLAIMS_DIR),
        }
    }

    pub fn element(&self, id: &str) -> String {
        child_path(&self.elements, id)
    }

    pub fn result(&self, id: &str) -> String {
        child_path(&self.results, id)
    }

    pub fn claim(&self, id: &str) -> String {
        child_path(&self.claims, id)
    }

    pub fn element_prefix(&self) -> String {
        child_path(&self.elements, ELEMENT_PREFIX)
    }
}
