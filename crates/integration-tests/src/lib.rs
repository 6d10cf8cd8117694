//! Integration tests for the Kushie cart sync core.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p kushie-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `sign_in_merge` - Anonymous carts merged into an account
//! - `multi_tab` - Tabs sharing one browser origin
//! - `multi_device` - Devices sharing one remote account
//! - `failures` - Denied, offline and half-acknowledged remote writes
//!
//! Everything runs in memory: one [`MemoryDocumentStore`] plays the remote
//! backend shared by all devices, and each device owns a [`MemoryOrigin`]
//! whose tabs share browser-local storage.

use std::sync::Arc;

use kushie_cart_sync::config::RemoteOptions;
use kushie_cart_sync::local::{LocalStore, MemoryOrigin};
use kushie_cart_sync::remote::MemoryDocumentStore;
use kushie_cart_sync::CartSession;
use kushie_core::{Price, Product, ProductSource, UserId};

/// Remote backend shared by every device in a test.
#[derive(Debug, Clone, Default)]
pub struct TestBackend {
    pub store: MemoryDocumentStore,
}

impl TestBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new device (browser) with its own local storage.
    #[must_use]
    pub fn device(&self) -> Device {
        Device {
            origin: MemoryOrigin::new(),
            store: self.store.clone(),
        }
    }
}

/// One browser: a local storage origin plus access to the shared backend.
#[derive(Debug, Clone)]
pub struct Device {
    pub origin: MemoryOrigin,
    store: MemoryDocumentStore,
}

impl Device {
    /// Open a new tab with its own anonymous session.
    #[must_use]
    pub fn open_tab(&self) -> CartSession {
        CartSession::new(
            LocalStore::new(Arc::new(self.origin.tab())),
            Arc::new(self.store.clone()),
            RemoteOptions::default(),
        )
    }

    /// Local storage as seen from a fresh tab.
    #[must_use]
    pub fn local(&self) -> LocalStore {
        LocalStore::new(Arc::new(self.origin.tab()))
    }
}

/// Parse a user id.
///
/// # Panics
///
/// Panics if `uid` is blank.
#[must_use]
pub fn user(uid: &str) -> UserId {
    UserId::parse(uid).expect("valid user id")
}

/// A retail product priced in cents.
///
/// # Panics
///
/// Panics if `cents` is negative.
#[must_use]
pub fn product(id: &str, cents: i64) -> Product {
    Product::new(id, Price::from_cents(cents).expect("valid price")).with_meta("title", id)
}

/// A wholesale product priced in cents.
///
/// # Panics
///
/// Panics if `cents` is negative.
#[must_use]
pub fn wholesale_product(id: &str, cents: i64) -> Product {
    product(id, cents).with_source(ProductSource::Wholesale)
}
