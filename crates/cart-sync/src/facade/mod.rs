//! Reactive cart and wishlist views.
//!
//! # Architecture
//!
//! Each facade holds one backend at a time: local storage while the shopper
//! is anonymous, the remote store once signed in. Switching backends is the
//! only thing authentication changes; the facade API is the same in both
//! modes.
//!
//! Every mutation goes through the facade's write gate, so two mutations on
//! the same facade complete in call order. Inside the gate the next full
//! state is computed from the visible state, shown optimistically, then
//! handed to the backend.
//!
//! # Observing
//!
//! `subscribe()` returns a [`tokio::sync::watch::Receiver`] of the visible
//! collection. It changes on every optimistic mutation, every remote push and
//! every change another tab makes to local storage.

mod cart;
mod state;
mod wishlist;

pub use cart::CartFacade;
pub use wishlist::WishlistFacade;

/// Result of a facade mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The collection changed.
    Applied,
    /// The collection already had the requested state.
    Unchanged,
    /// The request was refused; nothing was written.
    Rejected(RejectReason),
}

impl Mutation {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Why a mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The product's source does not match the cart kind.
    KindMismatch,
    /// The product id does not normalize.
    InvalidId,
    /// A quantity of zero was requested.
    ZeroQuantity,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KindMismatch => write!(f, "kind_mismatch"),
            Self::InvalidId => write!(f, "invalid_id"),
            Self::ZeroQuantity => write!(f, "zero_quantity"),
        }
    }
}
