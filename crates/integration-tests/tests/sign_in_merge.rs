//! Integration tests for merging anonymous carts into an account at sign-in.

#![allow(clippy::unwrap_used)]

use kushie_cart_sync::remote::CartDocument;
use kushie_cart_sync::{MergeOutcome, Mutation, RejectReason};
use kushie_core::{CartKind, ProductSource, Wishlist};
use kushie_integration_tests::{TestBackend, product, user, wholesale_product};
use rust_decimal::Decimal;
use serde_json::Value;

fn dollars(amount: i64) -> Decimal {
    Decimal::new(amount * 100, 2)
}

#[tokio::test]
async fn test_guest_cart_merges_into_existing_account() {
    let backend = TestBackend::new();

    // The account already holds 1 x P1 ($10) and 1 x P2 ($5).
    let laptop = backend.device().open_tab();
    laptop.sign_in(user("u1")).await.unwrap();
    laptop.retail().add(&product("P1", 1000), 1).await;
    laptop.retail().add(&product("P2", 500), 1).await;

    // A guest on another device adds 2 x P1.
    let phone = backend.device().open_tab();
    phone.retail().add(&product("P1", 1000), 2).await;
    assert_eq!(phone.retail().total(), dollars(20));

    let report = phone.sign_in(user("u1")).await.unwrap();
    assert_eq!(report.retail, MergeOutcome::Merged { lines: 1, units: 2 });

    assert_eq!(phone.retail().total(), dollars(35));
    assert_eq!(phone.retail().count(), 4);
    assert_eq!(phone.retail().items().get("P1").unwrap().quantity, 3);

    // The other device is pushed the merged cart.
    assert_eq!(laptop.retail().total(), dollars(35));
    assert_eq!(laptop.retail().count(), 4);
}

#[tokio::test]
async fn test_empty_guest_cart_writes_nothing() {
    let backend = TestBackend::new();
    let tab = backend.device().open_tab();

    let report = tab.sign_in(user("u1")).await.unwrap();
    assert_eq!(report.retail, MergeOutcome::Skipped);
    assert_eq!(report.wholesale, MergeOutcome::Skipped);
    assert_eq!(report.wishlist, MergeOutcome::Skipped);

    assert_eq!(backend.store.value_at("carts/u1/items"), Value::Null);
    assert_eq!(backend.store.value_at("wishlists/u1"), Value::Null);
}

#[tokio::test]
async fn test_retry_after_lost_acknowledgement_does_not_double_count() {
    let backend = TestBackend::new();
    let laptop = backend.device().open_tab();
    laptop.sign_in(user("u1")).await.unwrap();
    laptop.retail().add(&product("P1", 1000), 1).await;

    let phone = backend.device().open_tab();
    phone.retail().add(&product("P1", 1000), 2).await;

    // The merge write lands but the client never hears back.
    backend.store.drop_next_ack();
    let first = phone.sign_in(user("u1")).await.unwrap();
    assert!(matches!(first.retail, MergeOutcome::Failed { .. }));
    assert_eq!(phone.retail().count(), 3);

    // The guest cart was kept and is merged again on the next sign-in.
    phone.sign_out().await;
    assert_eq!(phone.retail().count(), 2);

    let second = phone.sign_in(user("u1")).await.unwrap();
    assert_eq!(second.retail, MergeOutcome::AlreadyApplied);
    assert_eq!(phone.retail().count(), 3);
    assert_eq!(laptop.retail().count(), 3);

    phone.sign_out().await;
    assert!(phone.retail().items().is_empty());
}

#[tokio::test]
async fn test_cart_kinds_merge_separately() {
    let backend = TestBackend::new();
    let tab = backend.device().open_tab();

    tab.retail().add(&product("tee", 2500), 1).await;
    tab.wholesale().add(&wholesale_product("case", 12000), 3).await;
    assert_eq!(
        tab.wholesale().add(&product("tee", 2500), 1).await,
        Mutation::Rejected(RejectReason::KindMismatch)
    );
    assert_eq!(
        tab.retail()
            .add(&product("case", 12000).with_source(ProductSource::Wholesale), 1)
            .await,
        Mutation::Rejected(RejectReason::KindMismatch)
    );

    tab.sign_in(user("u1")).await.unwrap();

    let retail = CartDocument::from_value(&backend.store.value_at("carts/u1")).items;
    let wholesale = CartDocument::from_value(&backend.store.value_at("wholesaleCarts/u1")).items;
    assert!(retail.contains("tee") && !retail.contains("case"));
    assert!(wholesale.contains("case") && !wholesale.contains("tee"));
    assert!(tab.is_in_cart(CartKind::Wholesale, "case"));
    assert!(!tab.is_in_cart(CartKind::Retail, "case"));
}

#[tokio::test]
async fn test_guest_state_is_cleared_after_merge() {
    let backend = TestBackend::new();
    let device = backend.device();
    let tab = device.open_tab();
    tab.retail().add(&product("a", 1000), 1).await;
    tab.wishlist().add("gid://shopify/Product/42").await;

    let report = tab.sign_in(user("u1")).await.unwrap();
    assert!(report.retail.is_settled());
    assert!(report.wishlist.is_settled());

    let local = device.local();
    let cart: kushie_core::Cart = local.load(CartKind::Retail.local_namespace());
    let wishlist: Wishlist = local.load(kushie_core::WISHLIST_NAMESPACE);
    assert!(cart.is_empty());
    assert!(wishlist.is_empty());
    assert!(local.merge_token(CartKind::Retail.local_namespace()).is_none());

    assert!(tab.is_in_wishlist("42"));
    assert_eq!(
        backend.store.value_at("wishlists/u1/42"),
        Value::String("42".to_string())
    );
}

#[tokio::test]
async fn test_reload_of_signed_in_user_does_not_merge_again() {
    let backend = TestBackend::new();
    let device = backend.device();

    let laptop = backend.device().open_tab();
    laptop.sign_in(user("u1")).await.unwrap();
    laptop.retail().add(&product("P1", 1000), 1).await;

    // Guest items are still sitting in this browser when the page reloads.
    let before = device.open_tab();
    before.retail().add(&product("P1", 1000), 2).await;
    let writes = backend.store.write_count();

    let reloaded = device.open_tab();
    assert!(reloaded.resume(user("u1")).await);
    assert_eq!(reloaded.retail().count(), 1);
    assert_eq!(laptop.retail().count(), 1);
    assert_eq!(backend.store.write_count(), writes);

    let guest: kushie_core::Cart = device.local().load(CartKind::Retail.local_namespace());
    assert_eq!(guest.count(), 2);
}
