//! Cart kinds and product sources.
//!
//! The storefront runs two carts side by side: the general retail cart and
//! the bulk (wholesale) cart. They never share items: each kind has its own
//! local namespace and its own remote document collection, and only accepts
//! products whose declared [`ProductSource`] matches.

use serde::{Deserialize, Serialize};

/// Declared origin of a product, set by the catalog the product came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductSource {
    #[default]
    Retail,
    Wholesale,
}

impl std::fmt::Display for ProductSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retail => write!(f, "retail"),
            Self::Wholesale => write!(f, "wholesale"),
        }
    }
}

/// One of the two independent cart namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartKind {
    /// General retail cart, mirrored into the commerce cart service.
    Retail,
    /// Bulk ordering cart.
    Wholesale,
}

impl CartKind {
    /// Both kinds, in a stable order.
    pub const ALL: [Self; 2] = [Self::Retail, Self::Wholesale];

    /// Browser-local storage key holding this kind's anonymous cart.
    #[must_use]
    pub const fn local_namespace(self) -> &'static str {
        match self {
            Self::Retail => "localProducts",
            Self::Wholesale => "wholesaleCart",
        }
    }

    /// Remote collection holding one cart document per user.
    #[must_use]
    pub const fn remote_collection(self) -> &'static str {
        match self {
            Self::Retail => "carts",
            Self::Wholesale => "wholesaleCarts",
        }
    }

    /// The only product source this kind accepts.
    #[must_use]
    pub const fn source(self) -> ProductSource {
        match self {
            Self::Retail => ProductSource::Retail,
            Self::Wholesale => ProductSource::Wholesale,
        }
    }

    /// Whether a product with the given source may enter this cart.
    #[must_use]
    pub fn accepts(self, source: ProductSource) -> bool {
        self.source() == source
    }
}

impl std::fmt::Display for CartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retail => write!(f, "retail"),
            Self::Wholesale => write!(f, "wholesale"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_isolated() {
        assert!(CartKind::Retail.accepts(ProductSource::Retail));
        assert!(!CartKind::Retail.accepts(ProductSource::Wholesale));
        assert!(CartKind::Wholesale.accepts(ProductSource::Wholesale));
        assert!(!CartKind::Wholesale.accepts(ProductSource::Retail));
    }

    #[test]
    fn test_namespaces_are_distinct() {
        assert_ne!(
            CartKind::Retail.local_namespace(),
            CartKind::Wholesale.local_namespace()
        );
        assert_ne!(
            CartKind::Retail.remote_collection(),
            CartKind::Wholesale.remote_collection()
        );
    }
}
