//! Core types for the cart/wishlist synchronization core.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod key;
pub mod kind;
pub mod price;
pub mod token;
pub mod wishlist;

pub use cart::{Cart, CartLineItem, Product};
pub use id::{IdError, NormalizedId, RawId, UserId, ids_match, normalize};
pub use key::{StorageKey, to_storage_safe_key};
pub use kind::{CartKind, ProductSource};
pub use price::{Price, PriceError};
pub use token::MergeToken;
pub use wishlist::{WISHLIST_NAMESPACE, Wishlist};
