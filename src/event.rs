//! Multi-subscriber event fan-out.
//!
//! Components expose their outbound events through an [`EventHub`] instead of
//! ambient global callbacks. Every subscriber gets its own unbounded channel;
//! an emitted event is delivered to all current subscribers in registration
//! order. Disconnected subscribers are pruned on the next emit.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Mutex;

/// Observer-list event dispatcher.
///
/// Cloning the hub is not supported; share it behind an `Arc` instead.
pub struct EventHub<T: Clone + Send> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone + Send> EventHub<T> {
    /// Creates a hub with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    ///
    /// Events emitted before this call are not replayed.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Delivers `event` to every current subscriber in registration order.
    pub fn emit(&self, event: T) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<T: Clone + Send> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}
