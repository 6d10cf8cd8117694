//! Storage-safe keys for the remote keyed store.
//!
//! Remote document stores reject certain characters inside a key segment
//! (`/ . # $ [ ]` and control characters). A [`StorageKey`] is derived from a
//! [`NormalizedId`] by percent-escaping those characters, plus `%` itself so
//! that two different ids can never produce the same key.
//!
//! The mapping is one-way by contract: the remote wishlist stores the id as
//! the value at the key and never reconstructs it from the key.

use core::fmt;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;

use super::id::NormalizedId;

/// Characters escaped when deriving a storage key.
const ILLEGAL_KEY_CHARS: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'.')
    .add(b'#')
    .add(b'$')
    .add(b'[')
    .add(b']')
    .add(b'%');

/// A string legal as a single key segment in the remote keyed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the storage-safe key for a normalized id.
///
/// ```
/// use kushie_core::{normalize, to_storage_safe_key};
///
/// let id = normalize("kush.og/1g").unwrap();
/// assert_eq!(to_storage_safe_key(&id).as_str(), "kush%2Eog%2F1g");
/// ```
#[must_use]
pub fn to_storage_safe_key(id: &NormalizedId) -> StorageKey {
    StorageKey(utf8_percent_encode(id.as_str(), ILLEGAL_KEY_CHARS).to_string())
}
