//! Kushie Core - Shared cart and wishlist types.
//!
//! This crate provides the types used by every part of the cart/wishlist
//! synchronization core:
//! - `kushie-cart-sync` - Local and remote stores, merge engine, facades
//! - `kushie-integration-tests` - Cross-component scenarios
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage
//! access, no async runtime. Identity comparison (the key normalizer) lives
//! here so that every store compares product ids the same way.
//!
//! # Modules
//!
//! - [`types`] - Normalized ids, storage-safe keys, prices, carts, wishlists

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
