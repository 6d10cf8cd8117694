//! Authentication transitions for one browsing context.
//!
//! A [`CartSession`] owns the retail and wholesale cart facades and the
//! wishlist facade. Signing in merges the anonymous collections into the
//! account once, then points every facade at the remote store. Resuming an
//! account that was already signed in (after a reload) skips the merge.
//! Signing out points the facades back at local storage and leaves the
//! remote data alone.

use std::sync::Arc;

use kushie_core::{CartKind, RawId, UserId};
use parking_lot::Mutex;

use crate::commerce::CommerceCart;
use crate::config::{RemoteOptions, SyncConfig};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::facade::{CartFacade, WishlistFacade};
use crate::local::LocalStore;
use crate::merge::{MergeEngine, MergeOutcome};
use crate::remote::{DocumentStore, RemoteCartStore, RemoteWishlistStore};

/// Merge outcomes of one sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInReport {
    pub retail: MergeOutcome,
    pub wholesale: MergeOutcome,
    pub wishlist: MergeOutcome,
}

impl SignInReport {
    /// Outcome for one cart kind.
    #[must_use]
    pub const fn cart(&self, kind: CartKind) -> &MergeOutcome {
        match kind {
            CartKind::Retail => &self.retail,
            CartKind::Wholesale => &self.wholesale,
        }
    }
}

/// Carts and wishlist of one browsing context, plus its sign-in state.
pub struct CartSession {
    local: LocalStore,
    store: Arc<dyn DocumentStore>,
    options: RemoteOptions,
    merge: MergeEngine,
    retail: CartFacade,
    wholesale: CartFacade,
    wishlist: WishlistFacade,
    user: Mutex<Option<UserId>>,
    transition: tokio::sync::Mutex<()>,
}

impl CartSession {
    /// Create an anonymous session.
    #[must_use]
    pub fn new(local: LocalStore, store: Arc<dyn DocumentStore>, options: RemoteOptions) -> Self {
        Self {
            merge: MergeEngine::new(local.clone()),
            retail: CartFacade::new(CartKind::Retail, local.clone()),
            wholesale: CartFacade::new(CartKind::Wholesale, local.clone()),
            wishlist: WishlistFacade::new(local.clone()),
            local,
            store,
            options,
            user: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Create an anonymous session with local storage chosen by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the local storage directory cannot be opened.
    pub fn open(config: &SyncConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let local = LocalStore::open(config)?;
        Ok(Self::new(local, store, config.remote))
    }

    /// Mirror the retail cart into a commerce cart service.
    #[must_use]
    pub fn with_commerce(mut self, service: Arc<dyn CommerceCart>) -> Self {
        self.retail = self.retail.with_commerce(service);
        self
    }

    fn cart_store(&self, kind: CartKind) -> RemoteCartStore {
        RemoteCartStore::new(Arc::clone(&self.store), kind, self.options)
    }

    fn wishlist_store(&self) -> RemoteWishlistStore {
        RemoteWishlistStore::new(Arc::clone(&self.store), self.options)
    }

    /// Sign `user` in: merge the anonymous collections, then switch every
    /// facade to the remote store.
    ///
    /// Returns `None` when `user` is already signed in. Signing in as another
    /// user first signs the current one out.
    pub async fn sign_in(&self, user: UserId) -> Option<SignInReport> {
        let _transition = self.transition.lock().await;
        let current = self.user.lock().clone();
        if current.as_ref() == Some(&user) {
            tracing::debug!(user = %user, "Already signed in");
            return None;
        }
        if current.is_some() {
            self.detach_remote().await;
        }

        let retail_store = self.cart_store(CartKind::Retail);
        let wholesale_store = self.cart_store(CartKind::Wholesale);
        let wishlist_store = self.wishlist_store();

        let report = SignInReport {
            retail: self.merge.merge_cart(&retail_store, &user).await,
            wholesale: self.merge.merge_cart(&wholesale_store, &user).await,
            wishlist: self.merge.merge_wishlist(&wishlist_store, &user).await,
        };

        self.attach_remote(retail_store, wholesale_store, wishlist_store, &user)
            .await;

        set_sentry_user(&user);
        tracing::info!(
            user = %user,
            retail = ?report.retail,
            wholesale = ?report.wholesale,
            wishlist = ?report.wishlist,
            "Signed in"
        );
        *self.user.lock() = Some(user);
        Some(report)
    }

    /// Restore a user who was already signed in, without merging.
    ///
    /// Use this when the app starts with an authenticated user. Any
    /// anonymous state left in local storage stays there untouched. Returns
    /// `false` when `user` is already the session's user.
    pub async fn resume(&self, user: UserId) -> bool {
        let _transition = self.transition.lock().await;
        let current = self.user.lock().clone();
        if current.as_ref() == Some(&user) {
            return false;
        }
        if current.is_some() {
            self.detach_remote().await;
        }

        self.attach_remote(
            self.cart_store(CartKind::Retail),
            self.cart_store(CartKind::Wholesale),
            self.wishlist_store(),
            &user,
        )
        .await;

        set_sentry_user(&user);
        tracing::info!(user = %user, "Resumed session");
        *self.user.lock() = Some(user);
        true
    }

    /// Sign out: detach the remote subscriptions and read local storage
    /// again. Remote data is kept.
    pub async fn sign_out(&self) {
        let _transition = self.transition.lock().await;
        let Some(user) = self.user.lock().take() else {
            return;
        };
        self.detach_remote().await;
        clear_sentry_user();
        tracing::info!(user = %user, "Signed out");
    }

    async fn attach_remote(
        &self,
        retail: RemoteCartStore,
        wholesale: RemoteCartStore,
        wishlist: RemoteWishlistStore,
        user: &UserId,
    ) {
        self.retail.attach_remote(retail, user.clone()).await;
        self.wholesale.attach_remote(wholesale, user.clone()).await;
        self.wishlist.attach_remote(wishlist, user.clone()).await;
    }

    async fn detach_remote(&self) {
        self.retail.attach_local(self.local.clone()).await;
        self.wholesale.attach_local(self.local.clone()).await;
        self.wishlist.attach_local(self.local.clone()).await;
    }

    /// Signed-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.user.lock().clone()
    }

    #[must_use]
    pub const fn retail(&self) -> &CartFacade {
        &self.retail
    }

    #[must_use]
    pub const fn wholesale(&self) -> &CartFacade {
        &self.wholesale
    }

    /// Facade for one cart kind.
    #[must_use]
    pub const fn cart(&self, kind: CartKind) -> &CartFacade {
        match kind {
            CartKind::Retail => &self.retail,
            CartKind::Wholesale => &self.wholesale,
        }
    }

    #[must_use]
    pub const fn wishlist(&self) -> &WishlistFacade {
        &self.wishlist
    }

    #[must_use]
    pub fn is_in_cart(&self, kind: CartKind, id: impl Into<RawId>) -> bool {
        self.cart(kind).is_in_cart(id)
    }

    #[must_use]
    pub fn is_in_wishlist(&self, id: impl Into<RawId>) -> bool {
        self.wishlist.is_in_wishlist(id)
    }
}

impl std::fmt::Debug for CartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSession")
            .field("user", &self.user())
            .field("retail", &self.retail)
            .field("wholesale", &self.wholesale)
            .field("wishlist", &self.wishlist)
            .finish_non_exhaustive()
    }
}
