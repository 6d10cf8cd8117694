//! One-time migration of anonymous carts and wishlists at sign-in.
//!
//! # Cart merge
//!
//! 1. Load the anonymous cart. An empty cart ends the merge without touching
//!    the remote store.
//! 2. Read the user's cart document (created empty if absent).
//! 3. Sum the anonymous lines into the remote lines: shared ids add their
//!    quantities, remote-only lines stay in place, local-only lines are
//!    appended in local order.
//! 4. Write items and the merge record together as one full replace.
//! 5. On success clear the anonymous cart; on failure keep it for the next
//!    sign-in.
//!
//! # Retry safety
//!
//! The anonymous cart carries a [`MergeToken`](kushie_core::MergeToken). The merge record written with
//! the items lists what was summed in under that token. When a write reaches
//! the store but its acknowledgement is lost, the next attempt finds the
//! record and only sums the units that were not counted yet, so quantities
//! are never doubled. Units added to the guest cart after the lost write
//! still arrive.
//!
//! # Wishlist merge
//!
//! Set union through idempotent per-item adds; the anonymous wishlist is
//! cleared only when every add succeeded.

use std::collections::BTreeMap;

use kushie_core::{Cart, CartLineItem, UserId, WISHLIST_NAMESPACE, Wishlist};
use tracing::instrument;

use crate::error::add_breadcrumb;
use crate::local::LocalStore;
use crate::remote::{MergeRecord, RemoteCartStore, RemoteWishlistStore};

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing stored anonymously; the remote store was not contacted.
    Skipped,
    /// Anonymous entries were written to the account.
    Merged {
        /// Lines (or wishlist ids) merged.
        lines: usize,
        /// Units merged; equal to `lines` for wishlists.
        units: u64,
    },
    /// A previous attempt already landed; the anonymous copy was cleared.
    AlreadyApplied,
    /// The remote store could not be read or written; the anonymous copy
    /// was kept.
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl MergeOutcome {
    /// Whether the anonymous copy is gone after this attempt.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Migrates anonymous state from local storage into a user's account.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    local: LocalStore,
}

impl MergeEngine {
    #[must_use]
    pub const fn new(local: LocalStore) -> Self {
        Self { local }
    }

    /// Merge the anonymous cart of `remote`'s kind into the user's cart.
    #[instrument(skip(self, remote, user), fields(kind = %remote.kind(), user = %user))]
    pub async fn merge_cart(&self, remote: &RemoteCartStore, user: &UserId) -> MergeOutcome {
        let kind = remote.kind();
        let namespace = kind.local_namespace();

        let local: Cart = self.local.load(namespace);
        if local.is_empty() {
            tracing::debug!("No anonymous cart to merge");
            return MergeOutcome::Skipped;
        }
        let token = self.local.ensure_merge_token(namespace);

        let mut document = match remote.read(user).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cart for merge, keeping anonymous cart");
                return MergeOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let pending = unmerged(&local, document.merge_record(&token));
        if pending.is_empty() {
            self.local.clear(namespace);
            tracing::info!(token = %token, "Anonymous cart was already merged");
            add_breadcrumb(
                "merge",
                "Anonymous cart already merged",
                Some(&[("kind", kind.to_string().as_str())]),
            );
            return MergeOutcome::AlreadyApplied;
        }

        let merged: BTreeMap<String, u32> = pending
            .items()
            .iter()
            .filter_map(|item| {
                item.normalized_id()
                    .map(|id| (id.as_str().to_string(), item.quantity))
            })
            .collect();
        document.items.absorb(&pending);
        document.record_merge(token, &merged, remote.options().merge_history);

        if let Err(e) = remote.try_write_document(user, &document).await {
            tracing::warn!(error = %e, "Failed to write merged cart, keeping anonymous cart");
            return MergeOutcome::Failed {
                reason: e.to_string(),
            };
        }

        self.local.clear(namespace);
        let outcome = MergeOutcome::Merged {
            lines: pending.len(),
            units: pending.count(),
        };
        tracing::info!(
            lines = pending.len(),
            units = pending.count(),
            total_lines = document.items.len(),
            "Merged anonymous cart"
        );
        add_breadcrumb(
            "merge",
            "Merged anonymous cart",
            Some(&[
                ("kind", kind.to_string().as_str()),
                ("lines", pending.len().to_string().as_str()),
            ]),
        );
        outcome
    }

    /// Merge the anonymous wishlist into the user's wishlist.
    #[instrument(skip(self, remote, user), fields(user = %user))]
    pub async fn merge_wishlist(&self, remote: &RemoteWishlistStore, user: &UserId) -> MergeOutcome {
        let local: Wishlist = self.local.load(WISHLIST_NAMESPACE);
        if local.is_empty() {
            return MergeOutcome::Skipped;
        }

        let mut failure = None;
        for id in local.ids() {
            if let Err(e) = remote.try_add_item(user, id).await {
                tracing::warn!(id = %id, error = %e, "Failed to merge wishlist item");
                failure.get_or_insert_with(|| e.to_string());
            }
        }
        if let Some(reason) = failure {
            return MergeOutcome::Failed { reason };
        }

        self.local.clear(WISHLIST_NAMESPACE);
        tracing::info!(items = local.len(), "Merged anonymous wishlist");
        add_breadcrumb(
            "merge",
            "Merged anonymous wishlist",
            Some(&[("items", local.len().to_string().as_str())]),
        );
        MergeOutcome::Merged {
            lines: local.len(),
            units: u64::try_from(local.len()).unwrap_or(u64::MAX),
        }
    }
}

/// The part of `local` not yet summed in under its merge record.
fn unmerged(local: &Cart, record: Option<&MergeRecord>) -> Cart {
    let Some(record) = record else {
        return local.clone();
    };
    Cart::from_items(local.items().iter().filter_map(|item| {
        let id = item.normalized_id()?;
        let counted = record.quantities.get(id.as_str()).copied().unwrap_or(0);
        let quantity = item.quantity.checked_sub(counted).filter(|q| *q > 0)?;
        Some(CartLineItem {
            quantity,
            ..item.clone()
        })
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use kushie_core::{CartKind, MergeToken, Price, Product, normalize};

    use super::*;
    use crate::config::RemoteOptions;
    use crate::local::MemoryOrigin;
    use crate::remote::{CartDocument, MemoryDocumentStore};

    struct Fixture {
        local: LocalStore,
        memory: MemoryDocumentStore,
        carts: RemoteCartStore,
        wishlists: RemoteWishlistStore,
        engine: MergeEngine,
    }

    fn fixture() -> Fixture {
        let local = LocalStore::new(Arc::new(MemoryOrigin::new().tab()));
        let memory = MemoryDocumentStore::new();
        let carts = RemoteCartStore::new(
            Arc::new(memory.clone()),
            CartKind::Retail,
            RemoteOptions::default(),
        );
        let wishlists = RemoteWishlistStore::new(Arc::new(memory.clone()), RemoteOptions::default());
        Fixture {
            engine: MergeEngine::new(local.clone()),
            local,
            memory,
            carts,
            wishlists,
        }
    }

    fn user() -> UserId {
        UserId::parse("u1").unwrap()
    }

    fn product(id: &str) -> Product {
        Product::new(id, Price::from_cents(500).unwrap())
    }

    fn cart_of(lines: &[(&str, u32)]) -> Cart {
        let mut cart = Cart::new();
        for (id, quantity) in lines {
            cart.add(&product(id), *quantity);
        }
        cart
    }

    fn quantities(cart: &Cart) -> Vec<(String, u32)> {
        cart.items()
            .iter()
            .map(|item| (item.id.clone(), item.quantity))
            .collect()
    }

    fn remote_cart(f: &Fixture) -> Cart {
        CartDocument::from_value(&f.memory.value_at("carts/u1")).items
    }

    #[tokio::test]
    async fn test_empty_local_cart_skips_remote() {
        let f = fixture();
        assert_eq!(
            f.engine.merge_cart(&f.carts, &user()).await,
            MergeOutcome::Skipped
        );
        assert_eq!(f.memory.write_count(), 0);
    }

    #[tokio::test]
    async fn test_sums_shared_lines_and_keeps_remote_order() {
        let f = fixture();
        f.carts
            .try_write(&user(), &cart_of(&[("a", 3), ("b", 1)]))
            .await
            .unwrap();
        f.local
            .save("localProducts", &cart_of(&[("c", 1), ("gid://shopify/ProductVariant/a", 2)]));

        let outcome = f.engine.merge_cart(&f.carts, &user()).await;
        assert_eq!(outcome, MergeOutcome::Merged { lines: 2, units: 3 });

        let remote = remote_cart(&f);
        assert_eq!(remote.count(), 7);
        assert_eq!(remote.get("a").unwrap().quantity, 5);
        assert_eq!(remote.get("b").unwrap().quantity, 1);
        assert_eq!(remote.items().last().unwrap().id, "c");

        let local: Cart = f.local.load("localProducts");
        assert!(local.is_empty());
        assert!(f.local.merge_token("localProducts").is_none());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_local() {
        let f = fixture();
        f.local.save("localProducts", &cart_of(&[("a", 2)]));
        f.memory.deny_writes("carts/u1").unwrap();

        let outcome = f.engine.merge_cart(&f.carts, &user()).await;
        assert!(matches!(outcome, MergeOutcome::Failed { .. }));
        assert!(!outcome.is_settled());

        let local: Cart = f.local.load("localProducts");
        assert_eq!(local.count(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_lost_ack_does_not_double_count() {
        let f = fixture();
        f.carts.try_write(&user(), &cart_of(&[("a", 3)])).await.unwrap();
        f.local.save("localProducts", &cart_of(&[("a", 2)]));

        f.memory.drop_next_ack();
        let first = f.engine.merge_cart(&f.carts, &user()).await;
        assert!(matches!(first, MergeOutcome::Failed { .. }));
        assert_eq!(remote_cart(&f).count(), 5);

        let writes = f.memory.write_count();
        let second = f.engine.merge_cart(&f.carts, &user()).await;
        assert_eq!(second, MergeOutcome::AlreadyApplied);
        assert_eq!(f.memory.write_count(), writes);
        assert_eq!(remote_cart(&f).count(), 5);

        let local: Cart = f.local.load("localProducts");
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_retry_merges_only_new_units() {
        let f = fixture();
        f.carts.read(&user()).await.unwrap();
        f.local.save("localProducts", &cart_of(&[("a", 2)]));
        f.memory.drop_next_ack();
        f.engine.merge_cart(&f.carts, &user()).await;

        // Guest keeps shopping before signing in again.
        f.local.save("localProducts", &cart_of(&[("a", 3), ("b", 1)]));
        let outcome = f.engine.merge_cart(&f.carts, &user()).await;
        assert_eq!(outcome, MergeOutcome::Merged { lines: 2, units: 2 });
        assert_eq!(
            quantities(&remote_cart(&f)),
            vec![("a".to_string(), 3), ("b".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_wishlist_union() {
        let f = fixture();
        f.wishlists
            .try_add_item(&user(), &normalize("a").unwrap())
            .await
            .unwrap();
        let local: Wishlist = ["a", "b"].into_iter().map(|id| normalize(id).unwrap()).collect();
        f.local.save(WISHLIST_NAMESPACE, &local);

        let outcome = f.engine.merge_wishlist(&f.wishlists, &user()).await;
        assert_eq!(outcome, MergeOutcome::Merged { lines: 2, units: 2 });

        let remote = f.wishlists.read(&user()).await.unwrap();
        assert_eq!(remote.len(), 2);
        let local: Wishlist = f.local.load(WISHLIST_NAMESPACE);
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_wishlist_failure_keeps_local() {
        let f = fixture();
        let local: Wishlist = [normalize("a").unwrap()].into_iter().collect();
        f.local.save(WISHLIST_NAMESPACE, &local);
        f.memory.set_offline(true);

        let outcome = f.engine.merge_wishlist(&f.wishlists, &user()).await;
        assert!(matches!(outcome, MergeOutcome::Failed { .. }));
        let kept: Wishlist = f.local.load(WISHLIST_NAMESPACE);
        assert_eq!(kept, local);
    }

    #[test]
    fn test_unmerged_subtracts_recorded_units() {
        let record = MergeRecord {
            token: MergeToken::generate(),
            quantities: BTreeMap::from([("a".to_string(), 2), ("b".to_string(), 5)]),
        };
        let local = cart_of(&[("a", 3), ("b", 4), ("c", 1)]);
        let pending = unmerged(&local, Some(&record));
        assert_eq!(
            quantities(&pending),
            vec![("a".to_string(), 1), ("c".to_string(), 1)]
        );
    }
}
