//! Wishlist membership set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{NormalizedId, RawId};

/// Browser-local storage key holding the anonymous wishlist.
pub const WISHLIST_NAMESPACE: &str = "kushie_wishlist";

/// A set of normalized product ids that preserves insertion order.
///
/// Serialized as a JSON array of strings, the layout used by browser-local
/// storage. Entries that fail to normalize are dropped when loading.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Value>", into = "Vec<NormalizedId>")]
pub struct Wishlist {
    ids: Vec<NormalizedId>,
}

impl Wishlist {
    /// Create an empty wishlist.
    #[must_use]
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// The ids, in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[NormalizedId] {
        &self.ids
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the wishlist has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether the raw id is in the wishlist.
    #[must_use]
    pub fn contains(&self, id: impl Into<RawId>) -> bool {
        NormalizedId::parse(id).is_ok_and(|id| self.ids.contains(&id))
    }

    /// Insert an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: NormalizedId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove an id. Returns `false` if it was not present.
    pub fn remove(&mut self, id: &NormalizedId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Add every entry of `other` that is not already present.
    pub fn union(&mut self, other: &Self) {
        for id in &other.ids {
            self.insert(id.clone());
        }
    }
}

impl FromIterator<NormalizedId> for Wishlist {
    fn from_iter<I: IntoIterator<Item = NormalizedId>>(iter: I) -> Self {
        let mut wishlist = Self::new();
        for id in iter {
            wishlist.insert(id);
        }
        wishlist
    }
}

impl From<Vec<Value>> for Wishlist {
    fn from(values: Vec<Value>) -> Self {
        values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<NormalizedId>(value).ok())
            .collect()
    }
}

impl From<Wishlist> for Vec<NormalizedId> {
    fn from(wishlist: Wishlist) -> Self {
        wishlist.ids
    }
}
