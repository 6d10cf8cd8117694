//! Integration tests for remote failures.
//!
//! Failed writes must never lose what the shopper sees, and failed merges
//! must keep the guest cart for the next attempt.

#![allow(clippy::unwrap_used)]

use kushie_cart_sync::remote::SyncState;
use kushie_cart_sync::MergeOutcome;
use kushie_core::{Cart, CartKind};
use kushie_integration_tests::{TestBackend, product, user};

#[tokio::test]
async fn test_denied_write_keeps_optimistic_view_until_next_push() {
    let backend = TestBackend::new();
    let tab = backend.device().open_tab();
    tab.sign_in(user("u1")).await.unwrap();

    backend.store.deny_writes("carts/u1").unwrap();
    assert!(tab.retail().add(&product("a", 1000), 1).await.is_applied());
    assert!(tab.is_in_cart(CartKind::Retail, "a"));
    assert!(tab.retail().has_pending());

    // Another device writes once the rules allow it again; its push wins.
    backend.store.allow_all();
    let other = backend.device().open_tab();
    other.sign_in(user("u1")).await.unwrap();
    other.retail().add(&product("b", 500), 1).await;

    assert!(!tab.retail().has_pending());
    assert!(!tab.is_in_cart(CartKind::Retail, "a"));
    assert!(tab.is_in_cart(CartKind::Retail, "b"));
}

#[tokio::test]
async fn test_offline_sign_in_keeps_guest_cart() {
    let backend = TestBackend::new();
    let device = backend.device();
    let tab = device.open_tab();
    tab.retail().add(&product("a", 1000), 2).await;

    backend.store.set_offline(true);
    let report = tab.sign_in(user("u1")).await.unwrap();
    assert!(matches!(report.retail, MergeOutcome::Failed { .. }));

    // Unreadable remote state shows as an empty, live cart.
    assert_eq!(tab.retail().sync_state(), SyncState::Live);
    assert!(tab.retail().items().is_empty());
    let kept: Cart = device.local().load("localProducts");
    assert_eq!(kept.count(), 2);

    backend.store.set_offline(false);
    tab.sign_out().await;
    let report = tab.sign_in(user("u1")).await.unwrap();
    assert_eq!(report.retail, MergeOutcome::Merged { lines: 1, units: 2 });
    assert_eq!(tab.retail().count(), 2);
}

#[tokio::test]
async fn test_sign_out_keeps_remote_data() {
    let backend = TestBackend::new();
    let tab = backend.device().open_tab();
    tab.sign_in(user("u1")).await.unwrap();
    tab.retail().add(&product("a", 1000), 3).await;
    tab.wishlist().add("w").await;

    tab.sign_out().await;
    assert_eq!(tab.retail().sync_state(), SyncState::Detached);
    assert!(tab.retail().items().is_empty());
    assert!(!tab.is_in_wishlist("w"));
    assert_eq!(backend.store.listener_count(), 0);

    let other = backend.device().open_tab();
    other.sign_in(user("u1")).await.unwrap();
    assert_eq!(other.retail().count(), 3);
    assert!(other.is_in_wishlist("w"));
}

#[tokio::test]
async fn test_unreadable_wishlist_is_empty_and_live() {
    let backend = TestBackend::new();
    backend.store.deny_reads("wishlists/u1").unwrap();
    let tab = backend.device().open_tab();
    tab.sign_in(user("u1")).await.unwrap();

    assert_eq!(tab.wishlist().sync_state(), SyncState::Live);
    assert!(tab.wishlist().items().is_empty());
}
