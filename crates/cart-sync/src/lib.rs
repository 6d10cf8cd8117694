//! Kushie cart/wishlist synchronization core.
//!
//! Keeps the shopping carts and the wishlist consistent across the anonymous
//! browser-local store, the signed-in user's remote document store, and live
//! multi-tab subscriptions to that store.
//!
//! # Architecture
//!
//! - [`local`] - Browser-local snapshot storage with cross-tab change events
//! - [`remote`] - Remote document store, per-user cart documents, per-item
//!   wishlist keys
//! - [`merge`] - One-time migration of anonymous state at sign-in
//! - [`facade`] - The reactive cart and wishlist views the UI consumes
//! - [`session`] - Authentication transitions tying the pieces together
//! - [`commerce`] - Mirror of the retail cart into the commerce cart service
//!
//! Remote failures never surface as errors to the UI: writes that fail are
//! logged and swallowed, reads that fail yield empty collections.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod commerce;
pub mod config;
pub mod error;
pub mod facade;
pub mod local;
pub mod merge;
pub mod remote;
pub mod session;
pub mod subscription;
pub mod telemetry;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use facade::{CartFacade, Mutation, RejectReason, WishlistFacade};
pub use merge::{MergeEngine, MergeOutcome};
pub use session::{CartSession, SignInReport};
pub use subscription::Subscription;
