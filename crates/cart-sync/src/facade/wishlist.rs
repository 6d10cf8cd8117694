//! Wishlist facade.
//!
//! Local mode stores the whole set as one snapshot. Remote mode writes one key
//! per item, so only the changed item is sent.

use std::sync::Arc;

use async_trait::async_trait;
use kushie_core::{NormalizedId, RawId, UserId, WISHLIST_NAMESPACE, Wishlist};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use super::state::Shared;
use super::{Mutation, RejectReason};
use crate::error::add_breadcrumb;
use crate::local::LocalStore;
use crate::remote::{RemoteSubscription, RemoteWishlistStore, SyncState};
use crate::subscription::Subscription;

/// A single wishlist change.
#[derive(Debug, Clone, Copy)]
enum Change<'a> {
    Added(&'a NormalizedId),
    Removed(&'a NormalizedId),
    Cleared,
}

#[async_trait]
trait WishlistBackend: Send + Sync {
    /// Persist `change`; `next` is the full set after it.
    async fn commit(&self, change: Change<'_>, next: &Wishlist);

    fn sync_state(&self) -> SyncState;

    fn is_remote(&self) -> bool;

    fn detach(&self);
}

struct LocalWishlistBackend {
    local: LocalStore,
    shared: Arc<Shared<Wishlist>>,
    sync_state: SyncState,
    external: Mutex<Option<Subscription>>,
}

impl LocalWishlistBackend {
    fn open(local: LocalStore, shared: Arc<Shared<Wishlist>>, sync_state: SyncState) -> Self {
        let sink = Arc::clone(&shared);
        let external = local.on_external_change(WISHLIST_NAMESPACE, move |wishlist: Wishlist| {
            sink.confirm(wishlist);
        });
        shared.confirm(local.load(WISHLIST_NAMESPACE));
        Self {
            local,
            shared,
            sync_state,
            external: Mutex::new(Some(external)),
        }
    }
}

#[async_trait]
impl WishlistBackend for LocalWishlistBackend {
    async fn commit(&self, _change: Change<'_>, next: &Wishlist) {
        if next.is_empty() {
            self.local.clear(WISHLIST_NAMESPACE);
        } else {
            self.local.save(WISHLIST_NAMESPACE, next);
        }
        self.shared.confirm(next.clone());
    }

    fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn detach(&self) {
        self.external.lock().take();
    }
}

struct RemoteWishlistBackend {
    store: RemoteWishlistStore,
    user: UserId,
    subscription: Mutex<Option<RemoteSubscription>>,
}

impl RemoteWishlistBackend {
    async fn attach(
        store: RemoteWishlistStore,
        user: UserId,
        shared: Arc<Shared<Wishlist>>,
    ) -> Self {
        let subscription = store
            .subscribe(&user, move |wishlist: Wishlist| shared.confirm(wishlist))
            .await;
        Self {
            store,
            user,
            subscription: Mutex::new(Some(subscription)),
        }
    }
}

#[async_trait]
impl WishlistBackend for RemoteWishlistBackend {
    async fn commit(&self, change: Change<'_>, _next: &Wishlist) {
        match change {
            Change::Added(id) => self.store.add_item(&self.user, id).await,
            Change::Removed(id) => self.store.remove_item(&self.user, id).await,
            Change::Cleared => self.store.clear(&self.user).await,
        }
    }

    fn sync_state(&self) -> SyncState {
        self.subscription
            .lock()
            .as_ref()
            .map_or(SyncState::Detached, RemoteSubscription::state)
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn detach(&self) {
        self.subscription.lock().take();
    }
}

/// Reactive view of the wishlist.
pub struct WishlistFacade {
    shared: Arc<Shared<Wishlist>>,
    backend: RwLock<Arc<dyn WishlistBackend>>,
    gate: tokio::sync::Mutex<()>,
}

impl WishlistFacade {
    /// Create a facade backed by local storage.
    #[must_use]
    pub fn new(local: LocalStore) -> Self {
        let shared = Arc::new(Shared::new());
        let backend: Arc<dyn WishlistBackend> = Arc::new(LocalWishlistBackend::open(
            local,
            Arc::clone(&shared),
            SyncState::Uninitialized,
        ));
        Self {
            shared,
            backend: RwLock::new(backend),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    fn backend(&self) -> Arc<dyn WishlistBackend> {
        Arc::clone(&self.backend.read())
    }

    /// Switch to the signed-in user's remote wishlist.
    pub async fn attach_remote(&self, store: RemoteWishlistStore, user: UserId) {
        let _gate = self.gate.lock().await;
        self.backend().detach();
        let backend = RemoteWishlistBackend::attach(store, user, Arc::clone(&self.shared)).await;
        *self.backend.write() = Arc::new(backend);
    }

    /// Switch back to local storage.
    pub async fn attach_local(&self, local: LocalStore) {
        let _gate = self.gate.lock().await;
        let previous = self.backend();
        previous.detach();
        let sync_state = if previous.is_remote() {
            SyncState::Detached
        } else {
            previous.sync_state()
        };
        let backend = LocalWishlistBackend::open(local, Arc::clone(&self.shared), sync_state);
        *self.backend.write() = Arc::new(backend);
    }

    pub async fn add(&self, id: impl Into<RawId>) -> Mutation {
        let Some(id) = Self::parse(id) else {
            return Mutation::Rejected(RejectReason::InvalidId);
        };
        self.mutate(|wishlist| wishlist.insert(id.clone()).then_some(Change::Added(&id)))
            .await
    }

    pub async fn remove(&self, id: impl Into<RawId>) -> Mutation {
        let Some(id) = Self::parse(id) else {
            return Mutation::Rejected(RejectReason::InvalidId);
        };
        self.mutate(|wishlist| wishlist.remove(&id).then_some(Change::Removed(&id)))
            .await
    }

    /// Add the id if absent, remove it if present.
    pub async fn toggle(&self, id: impl Into<RawId>) -> Mutation {
        let Some(id) = Self::parse(id) else {
            return Mutation::Rejected(RejectReason::InvalidId);
        };
        self.mutate(|wishlist| {
            if wishlist.remove(&id) {
                Some(Change::Removed(&id))
            } else {
                wishlist.insert(id.clone());
                Some(Change::Added(&id))
            }
        })
        .await
    }

    pub async fn clear(&self) -> Mutation {
        self.mutate(|wishlist| {
            let changed = !wishlist.is_empty();
            wishlist.clear();
            changed.then_some(Change::Cleared)
        })
        .await
    }

    fn parse(id: impl Into<RawId>) -> Option<NormalizedId> {
        let raw = id.into();
        match NormalizedId::parse(raw.clone()) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(id = ?raw, error = %e, "Rejected wishlist mutation");
                add_breadcrumb("wishlist", "Rejected wishlist mutation", None);
                None
            }
        }
    }

    async fn mutate<'a, F>(&self, apply: F) -> Mutation
    where
        F: FnOnce(&mut Wishlist) -> Option<Change<'a>> + Send,
    {
        let _gate = self.gate.lock().await;
        let backend = self.backend();
        let mut next = self.shared.visible();
        let Some(change) = apply(&mut next) else {
            return Mutation::Unchanged;
        };

        self.shared.propose(next.clone());
        backend.commit(change, &next).await;
        Mutation::Applied
    }

    /// Visible wishlist.
    #[must_use]
    pub fn items(&self) -> Wishlist {
        self.shared.visible()
    }

    #[must_use]
    pub fn is_in_wishlist(&self, id: impl Into<RawId>) -> bool {
        self.shared.visible().contains(id)
    }

    /// Receive every change of the visible wishlist.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Wishlist> {
        self.shared.subscribe()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.has_pending()
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.backend().is_remote()
    }

    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.backend().sync_state()
    }
}

impl std::fmt::Debug for WishlistFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WishlistFacade")
            .field("remote", &self.is_remote())
            .field("items", &self.shared.visible().len())
            .finish_non_exhaustive()
    }
}
