//! Distributed Operation Queue
//!
//! A work queue living entirely in the coordination store. Any number of
//! processes may hold an `OperationQueue` over the same root; the store is the
//! only shared state and nothing is cached between calls.
//!
//! ## Layout
//! - `<root>/operations/operation-NNNNNNNNNN`: persistent sequential elements.
//! - `<root>/results/<id>`: ephemeral results written by consumers.
//! - `<root>/claims/<id>`: ephemeral claim markers.
//!
//! ## Stale results
//! Ids are reused once the elements subtree is recreated. A result left
//! under a reused id is deleted only by whoever holds that id's claim while
//! the element exists: the producer right after `enqueue`, or else the
//! consumer before it runs the element.
//!
//! ## Claiming
//! Consumers always try the smallest outstanding id first. A claim is the
//! creation of `claims/<id>`; only one creation can succeed, so an element is
//! handed to at most one consumer while that consumer's session lives. If the
//! claimant's session dies the marker vanishes and the element is delivered
//! again. An empty queue (or one whose elements are all claimed) is waited on
//! with one-shot child watches, registered again before every wait.

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::claim::ClaimedElement;
use super::types::QueuePaths;
use crate::store::types::last_segment;
use crate::store::{CoordinationStore, StoreError, StoreResult, WatchEvent};

enum ClaimAttempt<T> {
    Claimed(ClaimedElement<T>),
    /// Another consumer holds the claim.
    Taken,
    /// The element disappeared; the listing is stale.
    Vanished,
}

pub struct OperationQueue<T> {
    store: Arc<dyn CoordinationStore>,
    paths: QueuePaths,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for OperationQueue<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            paths: self.paths.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> OperationQueue<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    /// Opens the queue at `root`, creating its subtrees when missing.
    pub async fn new(store: Arc<dyn CoordinationStore>, root: &str) -> StoreResult<Self> {
        let queue = Self {
            store,
            paths: QueuePaths::new(root),
            _payload: PhantomData,
        };
        queue.ensure_paths().await?;
        tracing::debug!("Operation queue ready at {}", root);
        Ok(queue)
    }

    pub fn root(&self) -> &str {
        &self.paths.root
    }

    pub fn paths(&self) -> &QueuePaths {
        &self.paths
    }

    async fn ensure_paths(&self) -> StoreResult<()> {
        for path in [&self.paths.elements, &self.paths.results, &self.paths.claims] {
            self.store.create_persistent(path, None, true).await?;
        }
        Ok(())
    }

    /// Appends `payload` and returns its element id.
    pub async fn enqueue(&self, payload: &T) -> StoreResult<String> {
        let bytes = bincode::serialize(payload)?;
        let prefix = self.paths.element_prefix();

        let path = match self
            .store
            .create_persistent_sequential(&prefix, bytes.clone())
            .await
        {
            Err(StoreError::NoNode(_)) => {
                // Queue root was wiped underneath us.
                self.ensure_paths().await?;
                self.store.create_persistent_sequential(&prefix, bytes).await?
            }
            other => other?,
        };
        let id = last_segment(&path).to_string();
        self.clear_stale_result(&id).await?;

        tracing::debug!("Enqueued {} on {}", id, self.paths.root);
        Ok(id)
    }

    /// Sequence ids restart when the elements subtree is recreated, so a
    /// result left behind by an earlier holder of `id` must go.
    ///
    /// The delete only happens under the claim of `id` while the element
    /// still exists, so it can never hit a result a consumer published for
    /// this element. If a consumer already holds the claim, that consumer
    /// clears the stale result itself before executing.
    async fn clear_stale_result(&self, id: &str) -> StoreResult<()> {
        let claim_path = self.paths.claim(id);
        match self.store.create_ephemeral(&claim_path, Vec::new()).await {
            Ok(()) => {}
            Err(StoreError::NodeExists(_)) => {
                tracing::trace!("{} already claimed, consumer clears its result", id);
                return Ok(());
            }
            Err(StoreError::NoNode(_)) => {
                self.ensure_paths().await?;
                match self.store.create_ephemeral(&claim_path, Vec::new()).await {
                    Ok(()) => {}
                    Err(StoreError::NodeExists(_)) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }

        let cleared = async {
            if self.store.exists(&self.paths.element(id)).await? {
                self.store.delete(&self.paths.result(id)).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;
        self.store.delete(&claim_path).await?;
        cleared
    }

    /// Blocks until an element is claimed.
    pub async fn claim(&self) -> StoreResult<ClaimedElement<T>> {
        self.claim_cancellable(&CancellationToken::new()).await
    }

    /// Blocks until an element is claimed or `cancel` fires. Cancellation
    /// returns `StoreError::Interrupted` and leaves no watch registered.
    pub async fn claim_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> StoreResult<ClaimedElement<T>> {
        'select: loop {
            if cancel.is_cancelled() {
                return Err(interrupted());
            }

            let elements = self.store.watch_children(&self.paths.elements).await?;
            if elements.children().is_empty() {
                tracing::trace!("Queue {} empty, waiting", self.paths.root);
                wait_for(elements.changed(), cancel).await?;
                continue;
            }

            let mut ids = elements.children().to_vec();
            ids.sort();

            let claims = self.store.watch_children(&self.paths.claims).await?;
            let taken: HashSet<&String> = claims.children().iter().collect();

            for id in ids.iter().filter(|id| !taken.contains(id)) {
                if cancel.is_cancelled() {
                    return Err(interrupted());
                }
                match self.try_claim(id).await? {
                    ClaimAttempt::Claimed(element) => return Ok(element),
                    ClaimAttempt::Taken => continue,
                    ClaimAttempt::Vanished => continue 'select,
                }
            }

            // Everything outstanding is held by other consumers. Either a new
            // element or a released claim is worth another look.
            tracing::trace!("All elements of {} are claimed, waiting", self.paths.root);
            tokio::select! {
                _ = cancel.cancelled() => return Err(interrupted()),
                event = elements.changed() => { event?; }
                event = claims.changed() => { event?; }
            }
        }
    }

    async fn try_claim(&self, id: &str) -> StoreResult<ClaimAttempt<T>> {
        let claim_path = self.paths.claim(id);
        let token = uuid::Uuid::new_v4().to_string();

        match self.store.create_ephemeral(&claim_path, token.into_bytes()).await {
            Ok(()) => {}
            Err(StoreError::NodeExists(_)) => return Ok(ClaimAttempt::Taken),
            Err(StoreError::NoNode(_)) => {
                self.ensure_paths().await?;
                return Ok(ClaimAttempt::Vanished);
            }
            Err(e) => return Err(e),
        }

        let bytes = match self.store.read_data(&self.paths.element(id)).await {
            Ok(bytes) => bytes,
            Err(StoreError::NoNode(_)) => {
                tracing::debug!("Element {} vanished during claim", id);
                self.store.delete(&claim_path).await?;
                return Ok(ClaimAttempt::Vanished);
            }
            Err(e) => {
                let _ = self.store.delete(&claim_path).await;
                return Err(e);
            }
        };

        // Holding the claim with the element present: any result under this
        // id is left over from an earlier element with the same id.
        if let Err(e) = self.store.delete(&self.paths.result(id)).await {
            let _ = self.store.delete(&claim_path).await;
            return Err(e);
        }

        match bincode::deserialize::<T>(&bytes) {
            Ok(payload) => {
                tracing::debug!("Claimed {} from {}", id, self.paths.root);
                Ok(ClaimAttempt::Claimed(ClaimedElement::new(
                    self.store.clone(),
                    self.paths.clone(),
                    id.to_string(),
                    payload,
                )))
            }
            Err(e) => {
                // The claim stays, parking the element until this session ends.
                tracing::error!("Element {} of {} is undecodable: {}", id, self.paths.root, e);
                Err(StoreError::Encoding(e))
            }
        }
    }

    /// Blocking claim-and-remove of the smallest element.
    pub async fn dequeue(&self) -> StoreResult<T> {
        self.claim().await?.complete().await
    }

    /// Like [`Self::dequeue`], but first publishes `result` under the
    /// element id for the producer to collect.
    pub async fn dequeue_with_result<R: Serialize + Sync>(&self, result: &R) -> StoreResult<T> {
        self.claim().await?.complete_with_result(result).await
    }

    pub async fn dequeue_cancellable(&self, cancel: &CancellationToken) -> StoreResult<T> {
        self.claim_cancellable(cancel).await?.complete().await
    }

    /// Payload of the smallest unclaimed element, without removing it.
    pub async fn peek(&self) -> StoreResult<Option<T>> {
        let mut ids = self.list(&self.paths.elements).await?;
        ids.sort();
        let claimed = self.list(&self.paths.claims).await?;

        for id in ids.iter().filter(|id| !claimed.contains(*id)) {
            match self.store.read_data_if_exists(&self.paths.element(id)).await? {
                Some(bytes) => return Ok(Some(bincode::deserialize(&bytes)?)),
                None => continue,
            }
        }
        Ok(None)
    }

    /// Result published for `id`, if any. With `remove`, the result is
    /// deleted after being read.
    pub async fn get_result<R: DeserializeOwned>(
        &self,
        id: &str,
        remove: bool,
    ) -> StoreResult<Option<R>> {
        let path = self.paths.result(id);
        let Some(bytes) = self.store.read_data_if_exists(&path).await? else {
            return Ok(None);
        };
        if remove {
            self.store.delete(&path).await?;
        }
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    pub async fn contains_element(&self, id: &str) -> StoreResult<bool> {
        self.store.exists(&self.paths.element(id)).await
    }

    /// Number of elements not claimed by any consumer. A point-in-time
    /// estimate; concurrent claims may change it immediately.
    pub async fn size(&self) -> StoreResult<usize> {
        let elements = self.list(&self.paths.elements).await?;
        let claimed: HashSet<String> = self.list(&self.paths.claims).await?.into_iter().collect();
        Ok(elements.iter().filter(|id| !claimed.contains(*id)).count())
    }

    pub async fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.size().await? == 0)
    }

    async fn list(&self, path: &str) -> StoreResult<Vec<String>> {
        match self.store.get_children(path).await {
            Ok(children) => Ok(children),
            Err(StoreError::NoNode(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn interrupted() -> StoreError {
    StoreError::Interrupted("claim cancelled".to_string())
}

async fn wait_for(
    fired: impl std::future::Future<Output = StoreResult<WatchEvent>>,
    cancel: &CancellationToken,
) -> StoreResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(interrupted()),
        event = fired => {
            let event = event?;
            tracing::trace!("Queue watch fired: {:?}", event);
            Ok(())
        }
    }
}
