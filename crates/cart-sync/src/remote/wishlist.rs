//! Per-user wishlists stored as one key per item.
//!
//! Each item lives at `wishlists/{uid}/{storageKey}` with the normalized id as
//! its value. Adding and removing are single-key writes, so two devices
//! changing different items never overwrite each other.

use std::sync::Arc;

use kushie_core::{NormalizedId, UserId, Wishlist, to_storage_safe_key};
use serde_json::Value;
use tracing::instrument;

use super::{
    DocumentStore, RemoteSubscription, StoreError, ValueListener, join_path, with_timeout,
};
use crate::config::RemoteOptions;
use crate::subscription::Subscription;

/// Root collection of per-user wishlists.
const WISHLISTS: &str = "wishlists";

/// Remote wishlist store.
#[derive(Clone)]
pub struct RemoteWishlistStore {
    store: Arc<dyn DocumentStore>,
    options: RemoteOptions,
}

impl RemoteWishlistStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, options: RemoteOptions) -> Self {
        Self { store, options }
    }

    /// Path of the user's wishlist keyspace.
    #[must_use]
    pub fn wishlist_path(user: &UserId) -> String {
        join_path(&[WISHLISTS, user.as_str()])
    }

    /// Path of one item.
    #[must_use]
    pub fn item_path(user: &UserId, id: &NormalizedId) -> String {
        join_path(&[WISHLISTS, user.as_str(), to_storage_safe_key(id).as_str()])
    }

    /// Listen to the user's wishlist.
    ///
    /// Same delivery rules as the cart store: one immediate call, then one per
    /// change, and an empty wishlist when the keyspace cannot be read.
    #[instrument(skip(self, user, on_update), fields(user = %user))]
    pub async fn subscribe<F>(&self, user: &UserId, on_update: F) -> RemoteSubscription
    where
        F: Fn(Wishlist) + Send + Sync + 'static,
    {
        let mut subscription = RemoteSubscription::loading();
        let path = Self::wishlist_path(user);
        let on_update = Arc::new(on_update);

        let deliver = Arc::clone(&on_update);
        let listener: ValueListener = Arc::new(move |value: &Value| deliver(decode(value)));

        match with_timeout(self.options.timeout, self.store.subscribe(&path, listener)).await {
            Ok(inner) => subscription.go_live(inner),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to subscribe to wishlist");
                on_update(Wishlist::new());
                subscription.go_live(Subscription::noop());
            }
        }
        subscription
    }

    /// Read the user's wishlist once.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyspace cannot be read.
    pub async fn read(&self, user: &UserId) -> Result<Wishlist, StoreError> {
        let value = with_timeout(
            self.options.timeout,
            self.store.get(&Self::wishlist_path(user)),
        )
        .await?;
        Ok(decode(&value))
    }

    /// Add an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected, fails, or times out.
    #[instrument(skip(self, user, id), fields(user = %user, id = %id))]
    pub async fn try_add_item(&self, user: &UserId, id: &NormalizedId) -> Result<(), StoreError> {
        let path = Self::item_path(user, id);
        with_timeout(
            self.options.timeout,
            self.store.set(&path, Value::String(id.as_str().to_string())),
        )
        .await
    }

    /// Add an item. Failures are logged and swallowed.
    pub async fn add_item(&self, user: &UserId, id: &NormalizedId) {
        if let Err(e) = self.try_add_item(user, id).await {
            tracing::warn!(user = %user, id = %id, error = %e, "Failed to add wishlist item");
        }
    }

    /// Remove an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected, fails, or times out.
    #[instrument(skip(self, user, id), fields(user = %user, id = %id))]
    pub async fn try_remove_item(&self, user: &UserId, id: &NormalizedId) -> Result<(), StoreError> {
        let path = Self::item_path(user, id);
        with_timeout(self.options.timeout, self.store.remove(&path)).await
    }

    /// Remove an item. Failures are logged and swallowed.
    pub async fn remove_item(&self, user: &UserId, id: &NormalizedId) {
        if let Err(e) = self.try_remove_item(user, id).await {
            tracing::warn!(user = %user, id = %id, error = %e, "Failed to remove wishlist item");
        }
    }

    /// Remove every item in one operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected, fails, or times out.
    #[instrument(skip(self, user), fields(user = %user))]
    pub async fn try_clear(&self, user: &UserId) -> Result<(), StoreError> {
        with_timeout(
            self.options.timeout,
            self.store.remove(&Self::wishlist_path(user)),
        )
        .await
    }

    /// Remove every item. Failures are logged and swallowed.
    pub async fn clear(&self, user: &UserId) {
        if let Err(e) = self.try_clear(user).await {
            tracing::warn!(user = %user, error = %e, "Failed to clear wishlist");
        }
    }
}

impl std::fmt::Debug for RemoteWishlistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWishlistStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Decode a keyspace snapshot: the values of the per-item keys.
fn decode(value: &Value) -> Wishlist {
    match value {
        Value::Object(map) => Wishlist::from(map.values().cloned().collect::<Vec<_>>()),
        _ => Wishlist::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kushie_core::normalize;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::remote::MemoryDocumentStore;

    fn user() -> UserId {
        UserId::parse("u1").unwrap()
    }

    fn store() -> (MemoryDocumentStore, RemoteWishlistStore) {
        let memory = MemoryDocumentStore::new();
        let wishlists = RemoteWishlistStore::new(Arc::new(memory.clone()), RemoteOptions::default());
        (memory, wishlists)
    }

    #[tokio::test]
    async fn test_items_stored_under_safe_keys() {
        let (memory, wishlists) = store();
        let id = normalize("a.b/c").unwrap();
        wishlists.try_add_item(&user(), &id).await.unwrap();
        assert_eq!(
            memory.value_at("wishlists/u1"),
            json!({ "a%2Eb%2Fc": "a.b/c" })
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_are_idempotent() {
        let (memory, wishlists) = store();
        let id = normalize("gid://shopify/Product/9").unwrap();
        wishlists.try_add_item(&user(), &id).await.unwrap();
        wishlists.try_add_item(&user(), &id).await.unwrap();
        assert_eq!(wishlists.read(&user()).await.unwrap().len(), 1);

        wishlists.try_remove_item(&user(), &id).await.unwrap();
        wishlists.try_remove_item(&user(), &id).await.unwrap();
        assert!(wishlists.read(&user()).await.unwrap().is_empty());
        assert_eq!(memory.value_at("wishlists"), Value::Null);
    }

    #[tokio::test]
    async fn test_independent_adds_converge() {
        let (memory, device_a) = store();
        let device_b = RemoteWishlistStore::new(Arc::new(memory.clone()), RemoteOptions::default());
        let x = normalize("x").unwrap();
        let y = normalize("y").unwrap();

        let (user_a, user_b) = (user(), user());
        let (a, b) = tokio::join!(
            device_a.try_add_item(&user_a, &x),
            device_b.try_add_item(&user_b, &y)
        );
        a.unwrap();
        b.unwrap();

        let wishlist = device_a.read(&user()).await.unwrap();
        assert!(wishlist.contains("x"));
        assert!(wishlist.contains("y"));
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes_and_clear() {
        let (_, wishlists) = store();
        let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _subscription = wishlists
            .subscribe(&user(), move |wishlist| sink.lock().push(wishlist.len()))
            .await;

        wishlists.add_item(&user(), &normalize("a").unwrap()).await;
        wishlists.add_item(&user(), &normalize("b").unwrap()).await;
        wishlists.clear(&user()).await;

        assert_eq!(seen.lock().as_slice(), &[0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_read_failure_delivers_empty() {
        let (memory, wishlists) = store();
        memory.deny_reads("wishlists/u1").unwrap();
        let seen: Arc<Mutex<Vec<Wishlist>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let _subscription = wishlists
            .subscribe(&user(), move |wishlist| sink.lock().push(wishlist))
            .await;
        assert_eq!(seen.lock().as_slice(), &[Wishlist::new()]);
    }

    #[tokio::test]
    async fn test_try_add_surfaces_offline() {
        let (memory, wishlists) = store();
        memory.set_offline(true);
        assert!(matches!(
            wishlists.try_add_item(&user(), &normalize("a").unwrap()).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
