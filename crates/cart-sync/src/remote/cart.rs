//! Per-user cart documents.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kushie_core::{Cart, CartKind, MergeToken, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use super::{
    DocumentStore, RemoteSubscription, StoreError, ValueListener, join_path, with_timeout,
};
use crate::config::RemoteOptions;
use crate::subscription::Subscription;

/// Quantities summed into a remote cart by one anonymous cart's merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Token of the anonymous cart.
    pub token: MergeToken,
    /// Units merged so far, by normalized product id.
    #[serde(default)]
    pub quantities: BTreeMap<String, u32>,
}

/// The remote cart document of one user and cart kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartDocument {
    /// Cart lines.
    #[serde(default)]
    pub items: Cart,
    /// Most recent merges, oldest first.
    #[serde(default)]
    pub merges: Vec<MergeRecord>,
    /// Time of the last write.
    #[serde(
        default,
        rename = "updatedAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartDocument {
    /// Decode a stored document field by field, so a damaged field does not
    /// take the others down with it. `Null` is the empty document.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let items = match value.get("items") {
            Some(Value::Array(values)) => Cart::from(values.clone()),
            // Sparse arrays may come back as objects keyed by index.
            Some(Value::Object(map)) => Cart::from(map.values().cloned().collect::<Vec<_>>()),
            _ => Cart::new(),
        };
        let merges = value
            .get("merges")
            .and_then(|merges| serde_json::from_value(merges.clone()).ok())
            .unwrap_or_default();
        let updated_at = value
            .get("updatedAt")
            .and_then(|at| serde_json::from_value(at.clone()).ok());
        Self {
            items,
            merges,
            updated_at,
        }
    }

    /// The merge record of `token`, if that cart was merged here.
    #[must_use]
    pub fn merge_record(&self, token: &MergeToken) -> Option<&MergeRecord> {
        self.merges.iter().find(|record| &record.token == token)
    }

    /// Record that `merged` units were summed in for `token`, keeping at most
    /// `history` records.
    pub fn record_merge(&mut self, token: MergeToken, merged: &BTreeMap<String, u32>, history: usize) {
        let mut record = match self.merges.iter().position(|record| record.token == token) {
            Some(index) => self.merges.remove(index),
            None => MergeRecord {
                token,
                quantities: BTreeMap::new(),
            },
        };
        for (id, quantity) in merged {
            let total = record.quantities.entry(id.clone()).or_default();
            *total = total.saturating_add(*quantity);
        }
        self.merges.push(record);
        let excess = self.merges.len().saturating_sub(history.max(1));
        self.merges.drain(..excess);
    }
}

/// Remote store for one cart kind, one document per user.
#[derive(Clone)]
pub struct RemoteCartStore {
    store: Arc<dyn DocumentStore>,
    kind: CartKind,
    options: RemoteOptions,
}

impl RemoteCartStore {
    /// Create a store for `kind` over a document store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, kind: CartKind, options: RemoteOptions) -> Self {
        Self {
            store,
            kind,
            options,
        }
    }

    /// Cart kind served by this store.
    #[must_use]
    pub const fn kind(&self) -> CartKind {
        self.kind
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> RemoteOptions {
        self.options
    }

    /// Path of the user's cart document.
    #[must_use]
    pub fn document_path(&self, user: &UserId) -> String {
        join_path(&[self.kind.remote_collection(), user.as_str()])
    }

    /// Read the user's cart document, creating an empty one if absent.
    ///
    /// The created document holds only `updatedAt`: an absent `items` child
    /// is the empty collection, since the tree stores no empty arrays.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or created.
    #[instrument(skip(self, user), fields(kind = %self.kind, user = %user))]
    pub async fn read(&self, user: &UserId) -> Result<CartDocument, StoreError> {
        let path = self.document_path(user);
        let value = with_timeout(self.options.timeout, self.store.get(&path)).await?;
        if !value.is_null() {
            return Ok(CartDocument::from_value(&value));
        }

        // Touch only the timestamp so a concurrent first write keeps its items.
        let now = Utc::now();
        let mut children = Map::new();
        children.insert("updatedAt".to_string(), serde_json::to_value(now)?);
        with_timeout(self.options.timeout, self.store.update(&path, children)).await?;
        tracing::debug!(path = %path, "Created empty cart document");
        Ok(CartDocument {
            updated_at: Some(now),
            ..CartDocument::default()
        })
    }

    /// Listen to the user's cart.
    ///
    /// `on_update` is called once with the current items, then on every
    /// remote change. When the document cannot be read or subscribed,
    /// `on_update` receives an empty cart and the subscription still goes
    /// live.
    #[instrument(skip(self, user, on_update), fields(kind = %self.kind, user = %user))]
    pub async fn subscribe<F>(&self, user: &UserId, on_update: F) -> RemoteSubscription
    where
        F: Fn(Cart) + Send + Sync + 'static,
    {
        let mut subscription = RemoteSubscription::loading();
        let path = self.document_path(user);
        let on_update = Arc::new(on_update);

        if let Err(e) = self.read(user).await {
            tracing::warn!(path = %path, error = %e, "Failed to prepare cart document");
        }

        let deliver = Arc::clone(&on_update);
        let listener: ValueListener =
            Arc::new(move |value: &Value| deliver(CartDocument::from_value(value).items));

        match with_timeout(self.options.timeout, self.store.subscribe(&path, listener)).await {
            Ok(inner) => subscription.go_live(inner),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to subscribe to cart");
                on_update(Cart::new());
                subscription.go_live(Subscription::noop());
            }
        }
        subscription
    }

    /// Replace the user's cart items, keeping the merge records.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected, fails, or times out.
    #[instrument(skip(self, user, cart), fields(kind = %self.kind, user = %user, lines = cart.len()))]
    pub async fn try_write(&self, user: &UserId, cart: &Cart) -> Result<(), StoreError> {
        let path = self.document_path(user);
        let mut children = Map::new();
        children.insert("items".to_string(), serde_json::to_value(cart)?);
        children.insert("updatedAt".to_string(), serde_json::to_value(Utc::now())?);
        with_timeout(self.options.timeout, self.store.update(&path, children)).await
    }

    /// Replace the user's cart items. Failures are logged and swallowed.
    pub async fn write(&self, user: &UserId, cart: &Cart) {
        if let Err(e) = self.try_write(user, cart).await {
            tracing::warn!(
                kind = %self.kind,
                user = %user,
                error = %e,
                "Failed to write remote cart"
            );
        }
    }

    /// Replace the whole document, items and merge records together.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected, fails, or times out.
    #[instrument(skip(self, user, document), fields(kind = %self.kind, user = %user))]
    pub async fn try_write_document(
        &self,
        user: &UserId,
        document: &CartDocument,
    ) -> Result<(), StoreError> {
        let path = self.document_path(user);
        let document = CartDocument {
            updated_at: Some(Utc::now()),
            ..document.clone()
        };
        let value = serde_json::to_value(&document)?;
        with_timeout(self.options.timeout, self.store.set(&path, value)).await
    }
}

impl std::fmt::Debug for RemoteCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCartStore")
            .field("kind", &self.kind)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
