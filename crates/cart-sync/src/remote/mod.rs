//! Remote document store and the per-user cart and wishlist stores built on it.
//!
//! # Architecture
//!
//! - [`DocumentStore`] is the backing service: a JSON tree addressed by
//!   `/`-separated paths with push subscriptions, per-path security rules
//!   and no transactions across paths.
//! - [`RemoteCartStore`] keeps one document per user and cart kind, written
//!   as a full replace of the item collection.
//! - [`RemoteWishlistStore`] keeps one key per wishlist item so concurrent
//!   adds and removes of different items never race.
//!
//! # Failure policy
//!
//! Reads that fail resolve to empty collections. Writes that fail are logged
//! at `warn` and swallowed; the `try_*` variants surface the error for callers
//! that must know, such as the merge engine.

mod cart;
mod memory;
mod wishlist;

pub use cart::{CartDocument, MergeRecord, RemoteCartStore};
pub use memory::MemoryDocumentStore;
pub use wishlist::RemoteWishlistStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::subscription::Subscription;

/// Errors returned by a [`DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Security rules rejected the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The path contains an empty or illegal segment.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Callback receiving the value at a subscribed path (`Null` when absent).
pub type ValueListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// A remote JSON document store with push subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the value at `path`; `Null` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Value, StoreError>;

    /// Replace the value at `path`. Writing `Null` deletes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Replace several children of `path` in one atomic write.
    async fn update(&self, path: &str, children: Map<String, Value>) -> Result<(), StoreError>;

    /// Delete the value at `path` and everything beneath it.
    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    /// Listen to the value at `path`.
    ///
    /// The listener is called once with the current value before this
    /// returns, then after every change at, above or below `path`.
    async fn subscribe(&self, path: &str, listener: ValueListener)
    -> Result<Subscription, StoreError>;
}

/// Lifecycle of a remote subscription for one user session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No subscription has been requested.
    Uninitialized,
    /// Subscription requested, first value not yet delivered.
    Loading,
    /// Receiving pushes.
    Live,
    /// Torn down at sign-out.
    Detached,
}

/// A live remote subscription and its lifecycle state.
///
/// Dropping the handle detaches the listener and moves the state to
/// [`SyncState::Detached`].
#[must_use = "dropping a RemoteSubscription detaches it"]
pub struct RemoteSubscription {
    state: Arc<Mutex<SyncState>>,
    inner: Option<Subscription>,
}

impl RemoteSubscription {
    fn loading() -> Self {
        Self {
            state: Arc::new(Mutex::new(SyncState::Loading)),
            inner: None,
        }
    }

    fn go_live(&mut self, inner: Subscription) {
        self.inner = Some(inner);
        *self.state.lock() = SyncState::Live;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Detach now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.unsubscribe();
        }
        *self.state.lock() = SyncState::Detached;
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("state", &self.state())
            .finish()
    }
}

/// Join path segments with `/`.
fn join_path(segments: &[&str]) -> String {
    segments.join("/")
}

/// Run a store operation with an upper time bound.
async fn with_timeout<T, F>(timeout: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result: Result<(), StoreError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap_or_default(), 7);
    }

    #[test]
    fn test_remote_subscription_detaches_on_drop() {
        let mut subscription = RemoteSubscription::loading();
        assert_eq!(subscription.state(), SyncState::Loading);
        subscription.go_live(Subscription::noop());
        assert_eq!(subscription.state(), SyncState::Live);

        let state = Arc::clone(&subscription.state);
        drop(subscription);
        assert_eq!(*state.lock(), SyncState::Detached);
    }
}
