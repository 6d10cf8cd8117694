//! Mirror of the retail cart into the commerce cart service.
//!
//! The commerce service owns checkout. Every retail cart mutation is replayed
//! against it as line operations, and the line id it returns is stored on the
//! cart line so later updates and removals can address it. The mirror is
//! best-effort: failures are logged and the local view stays as it is.

use std::collections::HashMap;

use async_trait::async_trait;
use kushie_core::Cart;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors that can occur when talking to the commerce cart service.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// Service could not be reached.
    #[error("Commerce service unavailable: {0}")]
    Unavailable(String),

    /// User error from mutation (e.g., invalid input).
    #[error("User error: {0}")]
    UserError(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A remote commerce cart addressed by line ids.
#[async_trait]
pub trait CommerceCart: Send + Sync {
    /// Add `quantity` units of a variant; returns the new line id.
    async fn add_line(&self, variant_id: &str, quantity: u32) -> Result<String, CommerceError>;

    /// Set the quantity of a line.
    async fn update_line(&self, line_id: &str, quantity: u32) -> Result<(), CommerceError>;

    /// Remove a line.
    async fn remove_line(&self, line_id: &str) -> Result<(), CommerceError>;

    /// URL the shopper is sent to for checkout.
    async fn checkout_url(&self) -> Result<String, CommerceError>;
}

/// Replay the difference between `previous` and `next` on `service`.
///
/// Line ids returned for new lines are written into `next`.
pub async fn mirror(service: &dyn CommerceCart, previous: &Cart, next: &mut Cart) {
    for item in previous {
        if next.contains(item.id.as_str()) {
            continue;
        }
        if let Some(line_id) = &item.line_id
            && let Err(e) = service.remove_line(line_id).await
        {
            tracing::warn!(id = %item.id, line_id = %line_id, error = %e, "Failed to remove commerce line");
        }
    }

    let mut assigned = Vec::new();
    for item in next.items() {
        match &item.line_id {
            None => match service.add_line(&item.id, item.quantity).await {
                Ok(line_id) => assigned.push((item.id.clone(), line_id)),
                Err(e) => {
                    tracing::warn!(id = %item.id, error = %e, "Failed to add commerce line");
                }
            },
            Some(line_id) => {
                let unchanged = previous
                    .get(item.id.as_str())
                    .is_some_and(|before| before.quantity == item.quantity);
                if unchanged {
                    continue;
                }
                if let Err(e) = service.update_line(line_id, item.quantity).await {
                    tracing::warn!(id = %item.id, line_id = %line_id, error = %e, "Failed to update commerce line");
                }
            }
        }
    }

    for (id, line_id) in assigned {
        next.set_line_id(id.as_str(), line_id);
    }
}

#[derive(Debug, Default)]
struct MemoryCommerceState {
    lines: HashMap<String, (String, u32)>,
    next_line: u64,
    calls: Vec<String>,
    offline: bool,
}

/// In-memory commerce cart that records the calls made to it.
#[derive(Debug, Default)]
pub struct MemoryCommerceCart {
    state: Mutex<MemoryCommerceState>,
}

impl MemoryCommerceCart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Calls received so far, as `op:argument:quantity` strings.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Quantity held on a variant's line, if any.
    #[must_use]
    pub fn quantity_of(&self, variant_id: &str) -> Option<u32> {
        self.state
            .lock()
            .lines
            .values()
            .find(|(variant, _)| variant == variant_id)
            .map(|(_, quantity)| *quantity)
    }

    fn guard(state: &MemoryCommerceState) -> Result<(), CommerceError> {
        if state.offline {
            return Err(CommerceError::Unavailable("offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CommerceCart for MemoryCommerceCart {
    async fn add_line(&self, variant_id: &str, quantity: u32) -> Result<String, CommerceError> {
        let mut state = self.state.lock();
        Self::guard(&state)?;
        state.next_line += 1;
        let line_id = format!("line-{}", state.next_line);
        state
            .lines
            .insert(line_id.clone(), (variant_id.to_string(), quantity));
        state.calls.push(format!("add:{variant_id}:{quantity}"));
        Ok(line_id)
    }

    async fn update_line(&self, line_id: &str, quantity: u32) -> Result<(), CommerceError> {
        let mut state = self.state.lock();
        Self::guard(&state)?;
        let line = state
            .lines
            .get_mut(line_id)
            .ok_or_else(|| CommerceError::NotFound(line_id.to_string()))?;
        line.1 = quantity;
        state.calls.push(format!("update:{line_id}:{quantity}"));
        Ok(())
    }

    async fn remove_line(&self, line_id: &str) -> Result<(), CommerceError> {
        let mut state = self.state.lock();
        Self::guard(&state)?;
        state
            .lines
            .remove(line_id)
            .ok_or_else(|| CommerceError::NotFound(line_id.to_string()))?;
        state.calls.push(format!("remove:{line_id}"));
        Ok(())
    }

    async fn checkout_url(&self) -> Result<String, CommerceError> {
        let state = self.state.lock();
        Self::guard(&state)?;
        Ok(format!("https://checkout.example/cart/{}", state.lines.len()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kushie_core::{Price, Product};

    use super::*;

    fn product(id: &str) -> Product {
        Product::new(id, Price::from_cents(1000).unwrap())
    }

    #[tokio::test]
    async fn test_new_lines_get_line_ids() {
        let service = MemoryCommerceCart::new();
        let mut next = Cart::new();
        next.add(&product("gid://shopify/ProductVariant/1"), 2);

        mirror(&service, &Cart::new(), &mut next).await;

        assert_eq!(service.calls(), vec!["add:gid://shopify/ProductVariant/1:2"]);
        assert_eq!(next.get("1").unwrap().line_id.as_deref(), Some("line-1"));
    }

    #[tokio::test]
    async fn test_quantity_change_and_removal() {
        let service = MemoryCommerceCart::new();
        let mut first = Cart::new();
        first.add(&product("a"), 1);
        first.add(&product("b"), 1);
        mirror(&service, &Cart::new(), &mut first).await;

        let mut second = first.clone();
        second.set_quantity("a", 3);
        second.remove("b");
        mirror(&service, &first, &mut second).await;

        assert_eq!(
            service.calls(),
            vec!["add:a:1", "add:b:1", "remove:line-2", "update:line-1:3"]
        );
        assert_eq!(service.quantity_of("a"), Some(3));
        assert_eq!(service.quantity_of("b"), None);
    }

    #[tokio::test]
    async fn test_unchanged_lines_make_no_calls() {
        let service = MemoryCommerceCart::new();
        let mut cart = Cart::new();
        cart.add(&product("a"), 1);
        mirror(&service, &Cart::new(), &mut cart).await;

        let mut same = cart.clone();
        mirror(&service, &cart, &mut same).await;
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let service = MemoryCommerceCart::new();
        service.set_offline(true);
        let mut next = Cart::new();
        next.add(&product("a"), 1);

        mirror(&service, &Cart::new(), &mut next).await;
        assert!(next.get("a").unwrap().line_id.is_none());
        assert!(service.checkout_url().await.is_err());
    }
}
