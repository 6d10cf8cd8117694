//! In-memory origin storage shared between tabs.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{LocalStorage, LocalStoreError, StorageEvent, StorageListener};
use crate::subscription::Subscription;

#[derive(Default)]
struct OriginState {
    items: HashMap<String, String>,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,
    next_tab_id: u64,
    quota_bytes: Option<usize>,
}

struct ListenerEntry {
    id: u64,
    tab_id: u64,
    listener: StorageListener,
}

impl OriginState {
    fn used_bytes_with(&self, key: &str, value: &str) -> usize {
        let others: usize = self
            .items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        others + key.len() + value.len()
    }
}

/// Storage for one origin, shared by every tab opened on it.
///
/// Writes through one [`TabStorage`] are delivered as [`StorageEvent`]s to
/// listeners registered through the other tabs of the same origin.
#[derive(Clone, Default)]
pub struct MemoryOrigin {
    state: Arc<Mutex<OriginState>>,
}

impl MemoryOrigin {
    /// Create an empty origin without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty origin that rejects writes once keys plus values
    /// exceed `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let origin = Self::new();
        origin.state.lock().quota_bytes = Some(bytes);
        origin
    }

    /// Open a new tab (browsing context) on this origin.
    #[must_use]
    pub fn tab(&self) -> TabStorage {
        let tab_id = {
            let mut state = self.state.lock();
            state.next_tab_id += 1;
            state.next_tab_id
        };
        TabStorage {
            state: Arc::clone(&self.state),
            tab_id,
        }
    }
}

impl std::fmt::Debug for MemoryOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryOrigin")
            .field("keys", &state.items.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// One tab's view of a [`MemoryOrigin`].
pub struct TabStorage {
    state: Arc<Mutex<OriginState>>,
    tab_id: u64,
}

impl TabStorage {
    fn notify_others(&self, key: &str, new_value: Option<&str>) {
        // Listeners run outside the lock so they may read storage again.
        let listeners: Vec<StorageListener> = self
            .state
            .lock()
            .listeners
            .iter()
            .filter(|entry| entry.tab_id != self.tab_id)
            .map(|entry| Arc::clone(&entry.listener))
            .collect();

        if listeners.is_empty() {
            return;
        }
        let event = StorageEvent {
            key: key.to_string(),
            new_value: new_value.map(str::to_string),
        };
        for listener in listeners {
            listener(&event);
        }
    }
}

impl LocalStorage for TabStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        Ok(self.state.lock().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        {
            let mut state = self.state.lock();
            if let Some(quota) = state.quota_bytes
                && state.used_bytes_with(key, value) > quota
            {
                return Err(LocalStoreError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
            if state.items.get(key).is_some_and(|existing| existing == value) {
                return Ok(());
            }
            state.items.insert(key.to_string(), value.to_string());
        }
        self.notify_others(key, Some(value));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), LocalStoreError> {
        let removed = self.state.lock().items.remove(key).is_some();
        if removed {
            self.notify_others(key, None);
        }
        Ok(())
    }

    fn subscribe(&self, listener: StorageListener) -> Subscription {
        let id = {
            let mut state = self.state.lock();
            state.next_listener_id += 1;
            let id = state.next_listener_id;
            state.listeners.push(ListenerEntry {
                id,
                tab_id: self.tab_id,
                listener,
            });
            id
        };

        let state: Weak<Mutex<OriginState>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state.lock().listeners.retain(|entry| entry.id != id);
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_listener(counter: &Arc<AtomicUsize>) -> StorageListener {
        let counter = Arc::clone(counter);
        Arc::new(move |_event: &StorageEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_tabs_share_items() {
        let origin = MemoryOrigin::new();
        let a = origin.tab();
        let b = origin.tab();
        a.set_item("k", "v").unwrap();
        assert_eq!(b.get_item("k").unwrap().as_deref(), Some("v"));
        b.remove_item("k").unwrap();
        assert!(a.get_item("k").unwrap().is_none());
    }

    #[test]
    fn test_writer_tab_not_notified() {
        let origin = MemoryOrigin::new();
        let a = origin.tab();
        let b = origin.tab();
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        let _sub_a = a.subscribe(counting_listener(&calls_a));
        let _sub_b = b.subscribe(counting_listener(&calls_b));

        a.set_item("k", "1").unwrap();
        assert_eq!(calls_a.load(Ordering::SeqCst), 0);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_write_not_notified() {
        let origin = MemoryOrigin::new();
        let a = origin.tab();
        let b = origin.tab();
        let calls = Arc::new(AtomicUsize::new(0));
        let _sub = b.subscribe(counting_listener(&calls));

        a.set_item("k", "1").unwrap();
        a.set_item("k", "1").unwrap();
        a.remove_item("missing").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_subscription_detaches() {
        let origin = MemoryOrigin::new();
        let a = origin.tab();
        let b = origin.tab();
        let calls = Arc::new(AtomicUsize::new(0));
        let sub = b.subscribe(counting_listener(&calls));
        drop(sub);

        a.set_item("k", "1").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_quota() {
        let origin = MemoryOrigin::with_quota(10);
        let tab = origin.tab();
        tab.set_item("k", "12345").unwrap();
        assert!(matches!(
            tab.set_item("other", "123456"),
            Err(LocalStoreError::QuotaExceeded { .. })
        ));
        // Overwriting a key only counts the new value.
        tab.set_item("k", "123456789").unwrap();
    }
}
