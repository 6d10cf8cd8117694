//! Unified error handling with Sentry integration.
//!
//! Most failures in this crate are swallowed: a remote write that
//! fails is logged and the user keeps their optimistic view. [`SyncError`] is
//! returned only where a caller must act, such as opening storage at startup.
//! The Sentry helpers attach user context and breadcrumbs so that swallowed
//! failures, which reach Sentry through the tracing layer, carry the trail of
//! cart actions that led to them.

use thiserror::Error;

use crate::commerce::CommerceError;
use crate::config::ConfigError;
use crate::local::LocalStoreError;
use crate::remote::StoreError;

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Remote document store operation failed.
    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    /// Browser-local storage operation failed.
    #[error("Local storage error: {0}")]
    Local(#[from] LocalStoreError),

    /// Commerce cart service operation failed.
    #[error("Commerce error: {0}")]
    Commerce(#[from] CommerceError),

    /// Identifier could not be normalized.
    #[error("Invalid id: {0}")]
    Id(#[from] kushie_core::IdError),
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after sign-in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for cart actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("merge", "Merged local cart", Some(&[("kind", "retail")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::from(StoreError::PermissionDenied("carts/u1".to_string()));
        assert_eq!(
            err.to_string(),
            "Remote store error: Permission denied: carts/u1"
        );

        let err = SyncError::from(kushie_core::IdError::Empty);
        assert_eq!(err.to_string(), "Invalid id: identifier cannot be empty");
    }

    #[test]
    fn test_sentry_helpers_without_client() {
        // No client is bound in tests; the helpers must be harmless no-ops.
        set_sentry_user(&"uid-1");
        add_breadcrumb("cart", "added", Some(&[("id", "p1")]));
        clear_sentry_user();
    }
}
