//! Cart line items and the cart collection.
//!
//! A [`Cart`] is an ordered list of [`CartLineItem`]s, unique by normalized
//! id. The quantity of a stored line is always at least one: lowering a
//! quantity to zero removes the line instead of storing a zero.
//!
//! Carts are serialized as a plain JSON array so the same shape is used in
//! browser-local storage and inside the remote cart document.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::id::{NormalizedId, RawId};
use super::kind::ProductSource;
use super::price::Price;

/// A product as offered to the cart by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product or variant identifier, as known to the catalog.
    pub id: String,
    /// Current unit price.
    pub price: Price,
    /// Catalog the product was listed in.
    #[serde(default)]
    pub source: ProductSource,
    /// Display data (name, image, variant attributes).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Product {
    /// Create a retail product with no display metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, price: Price) -> Self {
        Self {
            id: id.into(),
            price,
            source: ProductSource::Retail,
            metadata: Map::new(),
        }
    }

    /// Set the declared product source.
    #[must_use]
    pub const fn with_source(mut self, source: ProductSource) -> Self {
        self.source = source;
        self
    }

    /// Attach a display field.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Product or variant identifier as added. Compared only after
    /// normalization.
    pub id: String,
    /// Units of this product, at least one.
    #[serde(alias = "qty", deserialize_with = "lenient_quantity")]
    pub quantity: u32,
    /// Unit price snapshot taken when the line was added.
    pub price: Price,
    /// Catalog the product was listed in.
    #[serde(default)]
    pub source: ProductSource,
    /// Line identifier in the commerce cart service, once mirrored.
    #[serde(default, rename = "lineId", skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,
    /// Display data carried through untouched.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl CartLineItem {
    /// Create a line for `quantity` units of `product`.
    #[must_use]
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            id: product.id.clone(),
            quantity,
            price: product.price,
            source: product.source,
            line_id: None,
            metadata: product.metadata.clone(),
        }
    }

    /// The normalized form of this line's id, if it has one.
    #[must_use]
    pub fn normalized_id(&self) -> Option<NormalizedId> {
        NormalizedId::parse(self.id.as_str()).ok()
    }

    /// Price of this line (unit price times quantity).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.line_total(self.quantity)
    }
}

/// Accept any integer quantity, clamping negatives to zero so the cart can
/// drop the line instead of failing to load.
fn lenient_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = i64::deserialize(deserializer)?;
    Ok(u32::try_from(value.max(0)).unwrap_or(u32::MAX))
}

/// An ordered collection of cart lines, unique by normalized id.
///
/// ## Examples
///
/// ```
/// use kushie_core::{Cart, Price, Product};
///
/// let tee = Product::new("gid://shopify/ProductVariant/7", Price::from_cents(1000).unwrap());
///
/// let mut cart = Cart::new();
/// cart.add(&tee, 2);
/// cart.add(&tee, 1);
/// assert_eq!(cart.len(), 1);
/// assert_eq!(cart.count(), 3);
///
/// cart.set_quantity("7", 0);
/// assert!(cart.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Value>", into = "Vec<CartLineItem>")]
pub struct Cart {
    items: Vec<CartLineItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from stored lines, dropping zero-quantity lines and folding
    /// duplicate ids into one line.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = CartLineItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            cart.insert(item);
        }
        cart
    }

    /// The lines, in order.
    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of all line totals, saturating at [`Decimal::MAX`].
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(CartLineItem::line_total)
            .try_fold(Decimal::ZERO, Decimal::checked_add)
            .unwrap_or(Decimal::MAX)
    }

    fn position(&self, id: &NormalizedId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.normalized_id().as_ref() == Some(id))
    }

    fn find(&self, id: impl Into<RawId>) -> Option<usize> {
        let id = NormalizedId::parse(id).ok()?;
        self.position(&id)
    }

    /// Get the line for a product id.
    #[must_use]
    pub fn get(&self, id: impl Into<RawId>) -> Option<&CartLineItem> {
        self.find(id).and_then(|i| self.items.get(i))
    }

    /// Whether a product id has a line in the cart.
    #[must_use]
    pub fn contains(&self, id: impl Into<RawId>) -> bool {
        self.find(id).is_some()
    }

    /// Add `quantity` units of a product, summing into an existing line.
    ///
    /// Returns `false` (and changes nothing) when `quantity` is zero or the
    /// product id does not normalize.
    pub fn add(&mut self, product: &Product, quantity: u32) -> bool {
        if quantity == 0 {
            return false;
        }
        self.insert(CartLineItem::from_product(product, quantity))
    }

    /// Insert a line, summing its quantity into an existing line with the
    /// same id. Zero-quantity lines and lines without a valid id are ignored.
    pub fn insert(&mut self, item: CartLineItem) -> bool {
        if item.quantity == 0 {
            return false;
        }
        let Some(id) = item.normalized_id() else {
            return false;
        };
        match self.position(&id).and_then(|i| self.items.get_mut(i)) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                if existing.line_id.is_none() {
                    existing.line_id = item.line_id;
                }
            }
            None => self.items.push(item),
        }
        true
    }

    /// Remove the line for a product id.
    pub fn remove(&mut self, id: impl Into<RawId>) -> Option<CartLineItem> {
        let index = self.find(id)?;
        Some(self.items.remove(index))
    }

    /// Set the quantity of an existing line.
    ///
    /// A quantity of zero or below removes the line. Returns whether the cart
    /// changed.
    pub fn set_quantity(&mut self, id: impl Into<RawId>, quantity: i64) -> bool {
        let Some(index) = self.find(id) else {
            return false;
        };
        if quantity <= 0 {
            self.items.remove(index);
            return true;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.items.get_mut(index) {
            Some(item) if item.quantity != quantity => {
                item.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    /// Record the commerce-service line id for a product id.
    pub fn set_line_id(&mut self, id: impl Into<RawId>, line_id: String) {
        if let Some(item) = self.find(id).and_then(|i| self.items.get_mut(i)) {
            item.line_id = Some(line_id);
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Merge an anonymous (local) cart into this (remote) cart.
    ///
    /// Lines present in both carts take the local line's snapshot with the
    /// quantities summed. Remote-only lines are kept unchanged, in place.
    /// Local-only lines are appended in local order.
    pub fn absorb(&mut self, local: &Self) {
        for local_item in &local.items {
            let Some(id) = local_item.normalized_id() else {
                continue;
            };
            match self.position(&id).and_then(|i| self.items.get_mut(i)) {
                Some(remote_item) => {
                    let quantity = remote_item.quantity.saturating_add(local_item.quantity);
                    let line_id = remote_item.line_id.take();
                    *remote_item = CartLineItem {
                        quantity,
                        line_id: local_item.line_id.clone().or(line_id),
                        ..local_item.clone()
                    };
                }
                None => self.items.push(local_item.clone()),
            }
        }
    }
}

impl From<Vec<Value>> for Cart {
    fn from(values: Vec<Value>) -> Self {
        Self::from_items(
            values
                .into_iter()
                .filter_map(|value| serde_json::from_value::<CartLineItem>(value).ok()),
        )
    }
}

impl From<Cart> for Vec<CartLineItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}

impl<'a> IntoIterator for &'a Cart {
    type Item = &'a CartLineItem;
    type IntoIter = std::slice::Iter<'a, CartLineItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
