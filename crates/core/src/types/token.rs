//! Merge tokens.
//!
//! An anonymous cart gets a random token when its first item is stored. When
//! the cart is merged into an account, the token is recorded in the remote
//! cart document in the same write as the merged items, along with the
//! quantities that were summed in. A later retry of the same merge finds the
//! token and only sums what was not already counted.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one anonymous cart for merge bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergeToken(Uuid);

impl MergeToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for MergeToken {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MergeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
