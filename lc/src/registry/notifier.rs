//! Notifier - closable broadcast channel for aggregated events

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// Default aggregated stream capacity (events)
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// An event republished from one registry entry, tagged with the entry's key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedEvent<K, E> {
    /// Key of the entry whose value changed
    pub key: K,
    /// The entry's own change event
    pub event: E,
}

/// Owned broadcast sender that can be closed explicitly
///
/// Closing drops the sender: current receivers drain what was already sent
/// and then observe `RecvError::Closed`. Receivers created after closing
/// are closed from the start.
pub struct Notifier<T> {
    tx: RwLock<Option<broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Notifier<T> {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "Notifier::new: called");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: RwLock::new(Some(tx)),
        }
    }

    /// Send `event` to all receivers. Dropped if closed or nobody listens.
    pub fn publish(&self, event: T) {
        if let Some(tx) = self.tx.read().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        match self.tx.read().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }
}

impl<T> Notifier<T> {
    /// Close the channel. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let closed = self.tx.write().take().is_some();
        if closed {
            debug!("Notifier::close: channel closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.read().as_ref().map_or(0, |tx| tx.receiver_count())
    }
}
