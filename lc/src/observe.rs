//! Change observation primitives
//!
//! Values that publish changes implement [`Observable`]. Each registered
//! observer is owned through a [`Subscription`]; disposing it (or dropping
//! it) detaches the observer synchronously, so no callback runs after
//! `dispose` returns.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

/// Callback invoked for every published event
pub type Observer<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Capability of a value to publish change notifications
///
/// Implementations may invoke observers while holding their own locks, so an
/// observer must not call back into the value it observes.
pub trait Observable {
    type Event: Clone + Send + 'static;

    /// Register `observer`; it stays attached until the returned subscription is disposed
    fn subscribe(&self, observer: Observer<Self::Event>) -> Subscription;
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle to an attached observer
///
/// Disposal is idempotent and also happens on drop.
pub struct Subscription {
    teardown: Mutex<Option<Teardown>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription with nothing to tear down
    pub fn empty() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Detach the observer. Later calls do nothing.
    pub fn dispose(&self) {
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.teardown.lock().is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct Observers<E> {
    next_id: u64,
    entries: Vec<(u64, Observer<E>)>,
}

/// Table of observers for one observable value
///
/// Observers run in registration order while the table is locked, which
/// keeps events from one source in mutation order. An observer must not
/// subscribe to or dispose from the same set inside its callback. Owners
/// usually notify while still holding their own state lock as well (see
/// [`Translations`](crate::translations::Translations)), so reading the
/// source from inside the callback deadlocks too.
pub struct ObserverSet<E> {
    inner: Arc<Mutex<Observers<E>>>,
}

impl<E: 'static> ObserverSet<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Observers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, observer: Observer<E>) -> Subscription {
        let id = {
            let mut observers = self.inner.lock();
            let id = observers.next_id;
            observers.next_id += 1;
            observers.entries.push((id, observer));
            id
        };
        trace!(id, "ObserverSet::subscribe");

        let inner: Weak<Mutex<Observers<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
                trace!(id, "ObserverSet: observer detached");
            }
        })
    }

    /// Deliver `event` to every attached observer
    pub fn notify(&self, event: &E) {
        let observers = self.inner.lock();
        for (_, observer) in &observers.entries {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: 'static> Default for ObserverSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_observer(counter: &Arc<AtomicUsize>) -> Observer<u32> {
        let counter = Arc::clone(counter);
        Box::new(move |value: &u32| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_reaches_all_observers() {
        let set = ObserverSet::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let _a = set.subscribe(counting_observer(&first));
        let _b = set.subscribe(counting_observer(&second));

        set.notify(&3);

        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_dispose_detaches_observer() {
        let set = ObserverSet::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = set.subscribe(counting_observer(&counter));

        set.notify(&1);
        subscription.dispose();
        subscription.dispose();
        set.notify(&1);

        assert!(subscription.is_disposed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_drop_detaches_observer() {
        let set = ObserverSet::new();
        let counter = Arc::new(AtomicUsize::new(0));
        drop(set.subscribe(counting_observer(&counter)));

        set.notify(&5);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_outliving_set_is_harmless() {
        let set = ObserverSet::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = set.subscribe(counting_observer(&counter));
        drop(set);
        subscription.dispose();
        assert!(subscription.is_disposed());
    }

    #[test]
    fn test_empty_subscription() {
        let subscription = Subscription::empty();
        assert!(subscription.is_disposed());
        subscription.dispose();
    }
}
