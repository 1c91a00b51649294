//! Listener registry shared by the detector and the event bus.
//!
//! Owned by the daemon loop, so registration takes `&mut self` and no
//! interior mutability is needed. Listeners must be `Send` because the
//! loop may run on any tokio worker.

use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by [`Callbacks::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<T> = Box<dyn Fn(&T) + Send>;

/// Ordered list of listeners notified with a borrowed value.
pub struct Callbacks<T> {
    entries: Vec<(CallbackId, Listener<T>)>,
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a listener. Listeners are notified in registration order.
    pub fn register<F>(&mut self, listener: F) -> CallbackId
    where
        F: Fn(&T) + Send + 'static,
    {
        let id = CallbackId::new();
        self.entries.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if the id was not registered.
    pub fn unregister(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() < before
    }

    pub fn notify(&self, value: &T) {
        for (_, listener) in &self.entries {
            listener(value);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("listeners", &self.entries.len())
            .finish()
    }
}
