//! Claimed Elements
//!
//! A [`ClaimedElement`] is an element this consumer holds the claim marker
//! for. Nobody else will receive it while the claim lives. The holder
//! finishes it with `complete`, `complete_with_result` or `release`.
//! Dropping an unfinished claim releases it in the background.

use serde::Serialize;
use std::sync::Arc;

use super::types::QueuePaths;
use crate::store::{CoordinationStore, StoreError, StoreResult};

pub struct ClaimedElement<T> {
    store: Arc<dyn CoordinationStore>,
    paths: QueuePaths,
    id: String,
    payload: Option<T>,
    finished: bool,
}

impl<T> ClaimedElement<T> {
    pub(crate) fn new(
        store: Arc<dyn CoordinationStore>,
        paths: QueuePaths,
        id: String,
        payload: T,
    ) -> Self {
        Self {
            store,
            paths,
            id,
            payload: Some(payload),
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// Removes the element and gives the payload back.
    pub async fn complete(mut self) -> StoreResult<T> {
        self.remove_element().await?;
        self.take_payload()
    }

    /// Publishes `result` under the element id, then removes the element.
    /// The result is ephemeral: it disappears if this session dies before
    /// the producer collects it.
    pub async fn complete_with_result<R: Serialize>(mut self, result: &R) -> StoreResult<T> {
        let bytes = bincode::serialize(result)?;
        let result_path = self.paths.result(&self.id);
        match self.store.create_ephemeral(&result_path, bytes.clone()).await {
            Ok(()) => {}
            Err(StoreError::NodeExists(_)) => {
                tracing::debug!("Overwriting leftover result {}", result_path);
                self.store.write_data(&result_path, bytes).await?;
            }
            Err(e) => return Err(e),
        }
        self.remove_element().await?;
        self.take_payload()
    }

    /// Gives the element back to the queue without consuming it.
    pub async fn release(mut self) -> StoreResult<()> {
        self.finished = true;
        tracing::debug!("Releasing claim on {}", self.id);
        self.store.delete(&self.paths.claim(&self.id)).await
    }

    /// Element first, claim second: a consumer that finds the claim gone
    /// must never find the element still present.
    async fn remove_element(&mut self) -> StoreResult<()> {
        self.store.delete(&self.paths.element(&self.id)).await?;
        self.finished = true;
        self.store.delete(&self.paths.claim(&self.id)).await
    }

    fn take_payload(&mut self) -> StoreResult<T> {
        self.payload
            .take()
            .ok_or_else(|| StoreError::Unexpected(format!("payload of {} already taken", self.id)))
    }
}

impl<T> Drop for ClaimedElement<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let store = self.store.clone();
        let claim = self.paths.claim(&self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Unfinished claim {} dropped, releasing", claim);
                handle.spawn(async move {
                    if let Err(e) = store.delete(&claim).await {
                        tracing::warn!("Failed to release claim {}: {}", claim, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Claim {} dropped outside a runtime; held until session ends", claim);
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ClaimedElement<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimedElement")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish()
    }
}
