//! Product identifier normalization.
//!
//! The same logical product reaches the cart from many call sites in many
//! shapes: a bare id, a number, a platform global id
//! (`gid://shopify/ProductVariant/123`), or an id with a tracking query
//! appended. [`NormalizedId`] is the one canonical form used for equality and
//! duplicate detection. Every membership check in the workspace goes through
//! [`normalize`] or [`ids_match`], never a raw string comparison.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of platform global ids (`gid://<platform>/<Type>/<id>`).
const GLOBAL_ID_PREFIX: &str = "gid://";

/// Errors that can occur when normalizing an identifier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Nothing is left after normalization.
    #[error("identifier cannot be empty")]
    Empty,
    /// A user id contains a character that cannot appear in a store path.
    #[error("user id cannot contain {0:?}")]
    IllegalChar(char),
}

/// A product identifier as received from a caller, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    /// String identifier.
    Text(String),
    /// Numeric identifier.
    Integer(i64),
}

impl From<&str> for RawId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for RawId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for RawId {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for RawId {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for RawId {
    fn from(value: u64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&NormalizedId> for RawId {
    fn from(value: &NormalizedId) -> Self {
        Self::Text(value.0.clone())
    }
}

impl From<NormalizedId> for RawId {
    fn from(value: NormalizedId) -> Self {
        Self::Text(value.0)
    }
}

/// Canonical, comparable form of a product identifier.
///
/// ## Rules
///
/// 1. Surrounding whitespace is trimmed.
/// 2. A platform global id keeps only its last path segment.
/// 3. A `?query` suffix is dropped.
/// 4. Whitespace is trimmed again; an empty result is rejected.
///
/// The output of these rules contains no `/`-separated global id prefix, no
/// `?` and no surrounding whitespace, so applying them twice is the same as
/// applying them once.
///
/// ## Examples
///
/// ```
/// use kushie_core::NormalizedId;
///
/// let a = NormalizedId::parse(" gid://shopify/ProductVariant/42 ").unwrap();
/// let b = NormalizedId::parse(42_i64).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "42");
///
/// assert!(NormalizedId::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawId", into = "String")]
pub struct NormalizedId(String);

impl NormalizedId {
    /// Normalize a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Empty`] if nothing remains after normalization.
    pub fn parse(raw: impl Into<RawId>) -> Result<Self, IdError> {
        let text = match raw.into() {
            RawId::Text(text) => text,
            RawId::Integer(n) => n.to_string(),
        };

        let mut id = text.trim();
        if id.starts_with(GLOBAL_ID_PREFIX) {
            id = id.rsplit('/').next().unwrap_or_default();
        }
        if let Some((head, _query)) = id.split_once('?') {
            id = head;
        }
        let id = id.trim();

        if id.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(id.to_owned()))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<RawId> for NormalizedId {
    type Error = IdError;

    fn try_from(raw: RawId) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<NormalizedId> for String {
    fn from(id: NormalizedId) -> Self {
        id.0
    }
}

impl AsRef<str> for NormalizedId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a raw identifier. Shorthand for [`NormalizedId::parse`].
///
/// # Errors
///
/// Returns [`IdError::Empty`] if nothing remains after normalization.
pub fn normalize(raw: impl Into<RawId>) -> Result<NormalizedId, IdError> {
    NormalizedId::parse(raw)
}

/// Whether two raw identifiers refer to the same product.
///
/// Identifiers that fail to normalize never match anything, including each
/// other.
#[must_use]
pub fn ids_match(a: impl Into<RawId>, b: impl Into<RawId>) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Identifier of an authenticated user in the remote store.
///
/// The id is used verbatim as one segment of the user's document paths, so
/// it may not contain `/ . # $ [ ]` or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parse a user id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Empty`] if the id is blank, or
    /// [`IdError::IllegalChar`] if it cannot be a single path segment.
    pub fn parse(uid: &str) -> Result<Self, IdError> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(IdError::Empty);
        }
        if let Some(c) = uid
            .chars()
            .find(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
        {
            return Err(IdError::IllegalChar(c));
        }
        Ok(Self(uid.to_owned()))
    }

    /// Get the user id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(uid: String) -> Result<Self, Self::Error> {
        Self::parse(&uid)
    }
}

impl From<UserId> for String {
    fn from(uid: UserId) -> Self {
        uid.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
