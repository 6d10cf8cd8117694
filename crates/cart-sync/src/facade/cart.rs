//! Cart facade and its local and remote backends.

use std::sync::Arc;

use async_trait::async_trait;
use kushie_core::{Cart, CartKind, NormalizedId, Product, RawId, UserId};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::sync::watch;

use super::state::Shared;
use super::{Mutation, RejectReason};
use crate::commerce::{CommerceCart, mirror};
use crate::error::add_breadcrumb;
use crate::local::LocalStore;
use crate::remote::{RemoteCartStore, RemoteSubscription, SyncState};
use crate::subscription::Subscription;

/// Where a cart's state is persisted.
#[async_trait]
trait CartBackend: Send + Sync {
    /// Persist `next` as the whole cart.
    async fn commit(&self, next: &Cart);

    fn sync_state(&self) -> SyncState;

    fn is_remote(&self) -> bool;

    /// Stop feeding the shared state.
    fn detach(&self);
}

/// Anonymous cart in browser-local storage.
struct LocalCartBackend {
    local: LocalStore,
    kind: CartKind,
    shared: Arc<Shared<Cart>>,
    sync_state: SyncState,
    external: Mutex<Option<Subscription>>,
}

impl LocalCartBackend {
    fn open(
        local: LocalStore,
        kind: CartKind,
        shared: Arc<Shared<Cart>>,
        sync_state: SyncState,
    ) -> Self {
        let namespace = kind.local_namespace();
        let sink = Arc::clone(&shared);
        let external = local.on_external_change(namespace, move |cart: Cart| sink.confirm(cart));
        shared.confirm(local.load(namespace));
        Self {
            local,
            kind,
            shared,
            sync_state,
            external: Mutex::new(Some(external)),
        }
    }
}

#[async_trait]
impl CartBackend for LocalCartBackend {
    async fn commit(&self, next: &Cart) {
        let namespace = self.kind.local_namespace();
        if next.is_empty() {
            // An emptied cart starts over with a fresh merge token.
            self.local.clear(namespace);
        } else {
            self.local.save(namespace, next);
            self.local.ensure_merge_token(namespace);
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

/// Signed-in user's cart document.
struct RemoteCartBackend {
    store: RemoteCartStore,
    user: UserId,
    subscription: Mutex<Option<RemoteSubscription>>,
}

impl RemoteCartBackend {
    async fn attach(store: RemoteCartStore, user: UserId, shared: Arc<Shared<Cart>>) -> Self {
        let subscription = store
            .subscribe(&user, move |cart: Cart| shared.confirm(cart))
            .await;
        Self {
            store,
            user,
            subscription: Mutex::new(Some(subscription)),
        }
    }
}

#[async_trait]
impl CartBackend for RemoteCartBackend {
    async fn commit(&self, next: &Cart) {
        // The optimistic view stays until the next push, even when this fails.
        self.store.write(&self.user, next).await;
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

/// Reactive view of one cart kind.
///
/// ## Examples
///
/// ```rust,ignore
/// let retail = CartFacade::new(CartKind::Retail, local.clone());
/// retail.add(&product, 2).await;
/// assert_eq!(retail.count(), 2);
///
/// let mut updates = retail.subscribe();
/// updates.changed().await?;
/// ```
pub struct CartFacade {
    kind: CartKind,
    shared: Arc<Shared<Cart>>,
    backend: RwLock<Arc<dyn CartBackend>>,
    gate: tokio::sync::Mutex<()>,
    commerce: Option<Arc<dyn CommerceCart>>,
}

impl CartFacade {
    /// Create a facade backed by local storage.
    #[must_use]
    pub fn new(kind: CartKind, local: LocalStore) -> Self {
        let shared = Arc::new(Shared::new());
        let backend: Arc<dyn CartBackend> = Arc::new(LocalCartBackend::open(
            local,
            kind,
            Arc::clone(&shared),
            SyncState::Uninitialized,
        ));
        Self {
            kind,
            shared,
            backend: RwLock::new(backend),
            gate: tokio::sync::Mutex::new(()),
            commerce: None,
        }
    }

    /// Mirror mutations into a commerce cart service. Only retail carts are
    /// mirrored; the service is ignored for other kinds.
    #[must_use]
    pub fn with_commerce(mut self, service: Arc<dyn CommerceCart>) -> Self {
        if self.kind == CartKind::Retail {
            self.commerce = Some(service);
        } else {
            tracing::warn!(kind = %self.kind, "Commerce mirror is only supported for retail carts");
        }
        self
    }

    #[must_use]
    pub const fn kind(&self) -> CartKind {
        self.kind
    }

    fn backend(&self) -> Arc<dyn CartBackend> {
        Arc::clone(&self.backend.read())
    }

    /// Switch to the signed-in user's remote cart.
    pub async fn attach_remote(&self, store: RemoteCartStore, user: UserId) {
        if store.kind() != self.kind {
            tracing::error!(
                kind = %self.kind,
                store_kind = %store.kind(),
                "Refusing to attach a remote store of another cart kind"
            );
            return;
        }
        let _gate = self.gate.lock().await;
        self.backend().detach();
        let backend = RemoteCartBackend::attach(store, user, Arc::clone(&self.shared)).await;
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
        let backend = LocalCartBackend::open(local, self.kind, Arc::clone(&self.shared), sync_state);
        *self.backend.write() = Arc::new(backend);
    }

    /// Add `quantity` units of `product`.
    pub async fn add(&self, product: &Product, quantity: u32) -> Mutation {
        let raw = RawId::from(product.id.as_str());
        if quantity == 0 {
            return self.reject(&raw, RejectReason::ZeroQuantity);
        }
        if !self.kind.accepts(product.source) {
            return self.reject(&raw, RejectReason::KindMismatch);
        }
        if NormalizedId::parse(raw.clone()).is_err() {
            return self.reject(&raw, RejectReason::InvalidId);
        }
        self.mutate(|cart| cart.add(product, quantity)).await
    }

    /// Remove a product's line.
    pub async fn remove(&self, id: impl Into<RawId>) -> Mutation {
        let raw = id.into();
        let Ok(id) = NormalizedId::parse(raw.clone()) else {
            return self.reject(&raw, RejectReason::InvalidId);
        };
        self.mutate(|cart| cart.remove(&id).is_some()).await
    }

    /// Set a line's quantity; zero or below removes the line.
    pub async fn update_quantity(&self, id: impl Into<RawId>, quantity: i64) -> Mutation {
        if quantity <= 0 {
            return self.remove(id).await;
        }
        let raw = id.into();
        let Ok(id) = NormalizedId::parse(raw.clone()) else {
            return self.reject(&raw, RejectReason::InvalidId);
        };
        self.mutate(|cart| cart.set_quantity(&id, quantity)).await
    }

    /// Remove every line.
    pub async fn clear(&self) -> Mutation {
        self.mutate(|cart| {
            let changed = !cart.is_empty();
            cart.clear();
            changed
        })
        .await
    }

    async fn mutate<F>(&self, apply: F) -> Mutation
    where
        F: FnOnce(&mut Cart) -> bool + Send,
    {
        let _gate = self.gate.lock().await;
        let backend = self.backend();
        let previous = self.shared.visible();
        let mut next = previous.clone();
        if !apply(&mut next) || next == previous {
            return Mutation::Unchanged;
        }

        self.shared.propose(next.clone());
        if let Some(commerce) = &self.commerce {
            mirror(commerce.as_ref(), &previous, &mut next).await;
            self.shared.propose(next.clone());
        }
        backend.commit(&next).await;
        Mutation::Applied
    }

    fn reject(&self, id: &RawId, reason: RejectReason) -> Mutation {
        tracing::warn!(kind = %self.kind, id = ?id, reason = %reason, "Rejected cart mutation");
        add_breadcrumb(
            "cart",
            "Rejected cart mutation",
            Some(&[
                ("kind", self.kind.to_string().as_str()),
                ("reason", reason.to_string().as_str()),
            ]),
        );
        Mutation::Rejected(reason)
    }

    /// Visible cart.
    #[must_use]
    pub fn items(&self) -> Cart {
        self.shared.visible()
    }

    /// Total units.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.shared.visible().count()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.shared.visible().total()
    }

    #[must_use]
    pub fn is_in_cart(&self, id: impl Into<RawId>) -> bool {
        self.shared.visible().contains(id)
    }

    /// Receive every change of the visible cart.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.shared.subscribe()
    }

    /// Whether an optimistic change has not been confirmed by a push yet.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.shared.has_pending()
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.backend().is_remote()
    }

    /// State of the remote subscription.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.backend().sync_state()
    }

    /// Checkout URL from the commerce service, when one is attached and
    /// reachable.
    pub async fn checkout_url(&self) -> Option<String> {
        let commerce = self.commerce.as_ref()?;
        match commerce.checkout_url().await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get checkout URL");
                None
            }
        }
    }
}

impl std::fmt::Debug for CartFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartFacade")
            .field("kind", &self.kind)
            .field("remote", &self.is_remote())
            .field("lines", &self.shared.visible().len())
            .finish_non_exhaustive()
    }
}
