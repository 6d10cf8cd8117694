//! Listener registration handles.

/// Handle for a registered change listener.
///
/// The listener stays attached for as long as the handle lives. Dropping the
/// handle, or calling [`Subscription::unsubscribe`], detaches it so no
/// callback reaches a torn-down consumer.
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    cleanup: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    /// Create a subscription that runs `cleanup` when detached.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn noop() -> Self {
        Self { cleanup: None }
    }

    /// Detach the listener now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::noop()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.cleanup.is_some())
            .finish()
    }
}
