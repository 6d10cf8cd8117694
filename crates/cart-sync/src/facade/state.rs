//! Optimistic and confirmed views of one collection.

use parking_lot::Mutex;
use tokio::sync::watch;

struct Slices<T> {
    /// Local view not yet confirmed by a push.
    pending: Option<T>,
    /// Last state received from the backend.
    confirmed: T,
}

/// State shared by a facade and its backend.
///
/// The visible value is `pending` when present, `confirmed` otherwise.
/// Confirming always clears `pending`, so a push from the remote store wins
/// over any optimistic change made before it arrived.
pub struct Shared<T> {
    slices: Mutex<Slices<T>>,
    sender: watch::Sender<T>,
}

impl<T> Shared<T>
where
    T: Clone + PartialEq + Default + Send + Sync,
{
    pub fn new() -> Self {
        let (sender, _) = watch::channel(T::default());
        Self {
            slices: Mutex::new(Slices {
                pending: None,
                confirmed: T::default(),
            }),
            sender,
        }
    }

    /// The value observers currently see.
    pub fn visible(&self) -> T {
        let slices = self.slices.lock();
        slices.pending.as_ref().unwrap_or(&slices.confirmed).clone()
    }

    /// Whether an optimistic change is waiting for confirmation.
    pub fn has_pending(&self) -> bool {
        self.slices.lock().pending.is_some()
    }

    /// Show `value` before the backend confirms it.
    pub fn propose(&self, value: T) {
        let mut slices = self.slices.lock();
        slices.pending = Some(value);
        self.publish(&slices);
    }

    /// Accept `value` from the backend, dropping any optimistic change.
    pub fn confirm(&self, value: T) {
        let mut slices = self.slices.lock();
        slices.pending = None;
        slices.confirmed = value;
        self.publish(&slices);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    fn publish(&self, slices: &Slices<T>) {
        let visible = slices.pending.as_ref().unwrap_or(&slices.confirmed);
        self.sender.send_if_modified(|current| {
            if current == visible {
                return false;
            }
            current.clone_from(visible);
            true
        });
    }
}

impl<T> Default for Shared<T>
where
    T: Clone + PartialEq + Default + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
