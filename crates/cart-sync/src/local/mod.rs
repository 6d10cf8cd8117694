//! Browser-local snapshot storage.
//!
//! # Architecture
//!
//! - [`LocalStorage`] is the raw key/value backend: synchronous string get/set
//!   by key, per origin, plus a change feed for writes made by *other*
//!   browsing contexts (the browser `storage` event).
//! - [`LocalStore`] is the adapter the rest of the crate uses. It stores one
//!   JSON snapshot per namespace and never fails from the caller's point of
//!   view: local storage is a best-effort cache, so backend errors are logged
//!   and swallowed, and corrupt data loads as an empty collection.
//!
//! # Backends
//!
//! - [`MemoryOrigin`] / [`TabStorage`] - in-memory origin shared by several
//!   tab handles, with cross-tab change events
//! - [`FileStorage`] - durable directory-backed storage

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::{MemoryOrigin, TabStorage};

use std::sync::Arc;

use kushie_core::MergeToken;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::SyncConfig;
use crate::subscription::Subscription;

/// Errors raised by a [`LocalStorage`] backend.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The origin's storage quota would be exceeded.
    #[error("Quota exceeded writing {key}")]
    QuotaExceeded {
        /// Key being written.
        key: String,
    },

    /// Key is not usable by this backend.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// A change made to the origin's storage by another browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed.
    pub key: String,
    /// New raw value, `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Callback for [`StorageEvent`]s.
pub type StorageListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Raw per-origin key/value storage.
///
/// Implementations must deliver [`StorageEvent`]s only to listeners of
/// *other* contexts than the one that wrote, matching browser semantics.
pub trait LocalStorage: Send + Sync {
    /// Read the raw value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError>;

    /// Write the raw value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    fn remove_item(&self, key: &str) -> Result<(), LocalStoreError>;

    /// Listen for changes made by other browsing contexts.
    fn subscribe(&self, _listener: StorageListener) -> Subscription {
        Subscription::noop()
    }
}

/// Side key holding the merge token for a namespace's anonymous cart.
fn merge_token_key(namespace: &str) -> String {
    format!("{namespace}:mergeToken")
}

/// Snapshot-per-namespace adapter over a [`LocalStorage`] backend.
#[derive(Clone)]
pub struct LocalStore {
    storage: Arc<dyn LocalStorage>,
}

impl LocalStore {
    /// Create an adapter over a backend.
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Open the backend selected by configuration: a [`FileStorage`] when a
    /// directory is configured, a fresh in-memory origin otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created.
    pub fn open(config: &SyncConfig) -> Result<Self, LocalStoreError> {
        let storage: Arc<dyn LocalStorage> = match &config.local_storage_dir {
            Some(dir) => Arc::new(FileStorage::open(dir)?),
            None => Arc::new(MemoryOrigin::new().tab()),
        };
        Ok(Self::new(storage))
    }

    /// Load the snapshot stored under `namespace`, or the empty value.
    #[must_use]
    pub fn load<T: DeserializeOwned + Default>(&self, namespace: &str) -> T {
        match self.storage.get_item(namespace) {
            Ok(Some(raw)) => parse_snapshot(namespace, &raw),
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Failed to read local snapshot");
                T::default()
            }
        }
    }

    /// Store `snapshot` under `namespace`. Failures are logged and swallowed.
    pub fn save<T: Serialize>(&self, namespace: &str, snapshot: &T) {
        let result = serde_json::to_string(snapshot)
            .map_err(LocalStoreError::from)
            .and_then(|raw| self.storage.set_item(namespace, &raw));
        if let Err(e) = result {
            tracing::warn!(namespace, error = %e, "Failed to save local snapshot");
        }
    }

    /// Delete the snapshot under `namespace` along with its merge token.
    pub fn clear(&self, namespace: &str) {
        for key in [namespace.to_string(), merge_token_key(namespace)] {
            if let Err(e) = self.storage.remove_item(&key) {
                tracing::warn!(namespace, key = %key, error = %e, "Failed to clear local snapshot");
            }
        }
    }

    /// Call `callback` with the new snapshot whenever another browsing
    /// context changes `namespace`.
    pub fn on_external_change<T, F>(&self, namespace: &str, callback: F) -> Subscription
    where
        T: DeserializeOwned + Default + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let namespace = namespace.to_string();
        self.storage.subscribe(Arc::new(move |event: &StorageEvent| {
            if event.key != namespace {
                return;
            }
            let snapshot = event
                .new_value
                .as_deref()
                .map_or_else(T::default, |raw| parse_snapshot(&namespace, raw));
            callback(snapshot);
        }))
    }

    /// The merge token of the anonymous cart under `namespace`, if any.
    #[must_use]
    pub fn merge_token(&self, namespace: &str) -> Option<MergeToken> {
        let key = merge_token_key(namespace);
        match self.storage.get_item(&key) {
            Ok(raw) => raw.and_then(|raw| serde_json::from_str(&raw).ok()),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Failed to read merge token");
                None
            }
        }
    }

    /// The merge token under `namespace`, generating and storing one if the
    /// namespace has none yet.
    pub fn ensure_merge_token(&self, namespace: &str) -> MergeToken {
        if let Some(token) = self.merge_token(namespace) {
            return token;
        }
        let token = MergeToken::generate();
        self.save(&merge_token_key(namespace), &token);
        token
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

fn parse_snapshot<T: DeserializeOwned + Default>(namespace: &str, raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(namespace, error = %e, "Discarding corrupt local snapshot");
        T::default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use kushie_core::{Cart, Price, Product, Wishlist, normalize};

    use super::*;

    fn tee() -> Product {
        Product::new("tee", Price::from_cents(1000).unwrap())
    }

    #[test]
    fn test_load_missing_is_empty() {
        let store = LocalStore::new(Arc::new(MemoryOrigin::new().tab()));
        let cart: Cart = store.load("localProducts");
        assert!(cart.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let store = LocalStore::new(Arc::new(MemoryOrigin::new().tab()));
        let mut cart = Cart::new();
        cart.add(&tee(), 2);
        store.save("localProducts", &cart);
        let loaded: Cart = store.load("localProducts");
        assert_eq!(loaded, cart);
    }

    #[test]
    fn test_corrupt_snapshot_loads_empty() {
        let tab = MemoryOrigin::new().tab();
        tab.set_item("kushie_wishlist", "{not json").unwrap();
        let store = LocalStore::new(Arc::new(tab));
        let wishlist: Wishlist = store.load("kushie_wishlist");
        assert!(wishlist.is_empty());
    }

    #[test]
    fn test_save_swallows_quota_errors() {
        let origin = MemoryOrigin::with_quota(8);
        let store = LocalStore::new(Arc::new(origin.tab()));
        let mut cart = Cart::new();
        cart.add(&tee(), 1);
        store.save("localProducts", &cart);
        let loaded: Cart = store.load("localProducts");
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_cross_tab_change_notifies_other_tab_only() {
        let origin = MemoryOrigin::new();
        let tab_a = LocalStore::new(Arc::new(origin.tab()));
        let tab_b = LocalStore::new(Arc::new(origin.tab()));

        let seen_a: Arc<Mutex<Vec<Cart>>> = Arc::default();
        let seen_b: Arc<Mutex<Vec<Cart>>> = Arc::default();
        let sink_a = Arc::clone(&seen_a);
        let sink_b = Arc::clone(&seen_b);
        let _sub_a = tab_a.on_external_change("localProducts", move |cart: Cart| {
            sink_a.lock().unwrap().push(cart);
        });
        let _sub_b = tab_b.on_external_change("localProducts", move |cart: Cart| {
            sink_b.lock().unwrap().push(cart);
        });

        let mut cart = Cart::new();
        cart.add(&tee(), 3);
        tab_a.save("localProducts", &cart);

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(seen_b.lock().unwrap().as_slice(), &[cart]);
    }

    #[test]
    fn test_cross_tab_ignores_other_namespaces() {
        let origin = MemoryOrigin::new();
        let tab_a = LocalStore::new(Arc::new(origin.tab()));
        let tab_b = LocalStore::new(Arc::new(origin.tab()));

        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let _sub = tab_b.on_external_change("wholesaleCart", move |_: Cart| {
            *counter.lock().unwrap() += 1;
        });

        tab_a.save("localProducts", &Cart::new());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_clear_notifies_empty_snapshot() {
        let origin = MemoryOrigin::new();
        let tab_a = LocalStore::new(Arc::new(origin.tab()));
        let tab_b = LocalStore::new(Arc::new(origin.tab()));

        let wishlist: Wishlist = [normalize("a").unwrap()].into_iter().collect();
        tab_a.save("kushie_wishlist", &wishlist);

        let seen: Arc<Mutex<Option<Wishlist>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _sub = tab_b.on_external_change("kushie_wishlist", move |w: Wishlist| {
            *sink.lock().unwrap() = Some(w);
        });

        tab_a.clear("kushie_wishlist");
        assert_eq!(seen.lock().unwrap().as_ref(), Some(&Wishlist::new()));
    }

    #[test]
    fn test_merge_token_lifecycle() {
        let store = LocalStore::new(Arc::new(MemoryOrigin::new().tab()));
        assert!(store.merge_token("localProducts").is_none());

        let token = store.ensure_merge_token("localProducts");
        assert_eq!(store.ensure_merge_token("localProducts"), token);
        assert_eq!(store.merge_token("localProducts"), Some(token));

        store.clear("localProducts");
        assert!(store.merge_token("localProducts").is_none());
    }
}
