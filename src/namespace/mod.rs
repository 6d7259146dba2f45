//! Coordination Namespace
//!
//! Maps every cluster concern (master queue, per-node queues, liveness,
//! metadata, metrics, shard-to-node index) to a path under a configurable root.
//!
//! ## Submodules
//! - **`types`**: The `PathDef` catalogue and defaults.
//! - **`scheme`**: `NamespaceScheme`, the pure path builder.

pub mod scheme;
pub mod types;

pub use scheme::NamespaceScheme;
pub use types::{DEFAULT_ROOT_PATH, PathDef};

use crate::store::{CoordinationStore, StoreResult};

/// Creates every persistent container of the namespace. Already existing
/// containers are left alone.
pub async fn ensure_layout(
    store: &dyn CoordinationStore,
    scheme: &NamespaceScheme,
) -> StoreResult<()> {
    for path in scheme.container_paths() {
        store.create_persistent(&path, None, true).await?;
    }
    tracing::debug!("Namespace layout ready under {}", scheme.root());
    Ok(())
}
