//! Keyed registry with change fan-in
//!
//! A [`Registry`] owns values indexed by key. Every value is [`Observable`];
//! the registry attaches one forwarding observer per entry that republishes
//! the value's events, tagged with the entry key, on a single aggregated
//! broadcast stream.
//!
//! ```text
//!   "en" -> Translations --observer--+
//!   "de" -> Translations --observer--+--> Notifier --> subscribe()
//!   "fr" -> Translations --observer--+      (KeyedEvent { key, event })
//! ```
//!
//! Replacing or removing an entry disposes its forwarding subscription
//! before the entry goes away, so a replaced value's later events never
//! reach the aggregated stream.

mod notifier;

pub use notifier::{DEFAULT_EVENT_CAPACITY, KeyedEvent, Notifier};

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::cache::LazyCache;
use crate::observe::{Observable, Subscription};

/// A stored value together with the subscription forwarding its events
struct Entry<V> {
    value: V,
    subscription: Arc<Subscription>,
}

impl<V: Clone> Clone for Entry<V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            subscription: Arc::clone(&self.subscription),
        }
    }
}

/// Concurrent keyed collection of observable values
pub struct Registry<K, V: Observable> {
    store: LazyCache<K, Entry<V>>,
    notifier: Arc<Notifier<KeyedEvent<K, V::Event>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Observable + Clone + Default,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a registry whose aggregated stream buffers `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        debug!(capacity, "Registry::with_capacity: called");
        Self {
            store: LazyCache::new(),
            notifier: Arc::new(Notifier::new(capacity)),
        }
    }

    /// Create a registry seeded with `entries`, each already forwarding its events
    pub fn with_entries(entries: impl IntoIterator<Item = (K, V)>, capacity: usize) -> Self {
        let notifier = Arc::new(Notifier::new(capacity));
        let store: LazyCache<K, Entry<V>> = entries
            .into_iter()
            .map(|(key, value)| {
                let entry = attach(&notifier, &key, value);
                (key, entry)
            })
            .collect();
        debug!(len = store.len(), "Registry::with_entries: seeded");
        Self { store, notifier }
    }

    pub fn contains(&self, key: impl Into<K>) -> bool {
        let key: K = key.into();
        self.store.contains_key(&key)
    }

    /// Look up a value without creating it
    pub fn try_get(&self, key: impl Into<K>) -> Option<V> {
        let key: K = key.into();
        self.store.try_get_value(&key).map(|entry| entry.value)
    }

    /// Get the value for `key`, creating and subscribing a default value if absent
    pub fn get(&self, key: impl Into<K>) -> V {
        let notifier = &self.notifier;
        self.store
            .get_or_add(key.into(), |key| attach(notifier, key, V::default()))
            .value
    }

    /// Install `value` under `key`, disposing the forwarding of any previous value first
    pub fn set(&self, key: impl Into<K>, value: V) {
        let notifier = &self.notifier;
        self.store.add_or_update(
            key.into(),
            |key| attach(notifier, key, value.clone()),
            |key, previous| {
                previous.subscription.dispose();
                attach(notifier, key, value.clone())
            },
        );
    }

    /// Remove the entry for `key`. Absent keys are ignored.
    pub fn remove(&self, key: impl Into<K>) {
        let key: K = key.into();
        let Some(removed) = self.store.try_remove(&key) else {
            return;
        };
        if let Some(entry) = removed.settled() {
            entry.subscription.dispose();
        }
    }

    /// Subscribe to key-tagged change events of every entry
    pub fn subscribe(&self) -> broadcast::Receiver<KeyedEvent<K, V::Event>> {
        self.notifier.subscribe()
    }

    /// Close the aggregated stream. Later calls do nothing.
    pub fn dispose(&self) {
        if self.notifier.close() {
            info!(entries = self.store.len(), "Registry disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.notifier.is_closed()
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Wrap `value` with a subscription forwarding its events under `key`
fn attach<K, V>(notifier: &Arc<Notifier<KeyedEvent<K, V::Event>>>, key: &K, value: V) -> Entry<V>
where
    K: Clone + Send + Sync + 'static,
    V: Observable,
{
    let notifier = Arc::clone(notifier);
    let tag = key.clone();
    let subscription = value.subscribe(Box::new(move |event: &V::Event| {
        notifier.publish(KeyedEvent {
            key: tag.clone(),
            event: event.clone(),
        });
    }));
    Entry {
        value,
        subscription: Arc::new(subscription),
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Observable + Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V: Observable> Drop for Registry<K, V> {
    fn drop(&mut self) {
        self.notifier.close();
    }
}

impl<K: Eq + Hash, V: Observable> fmt::Debug for Registry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("store", &self.store)
            .field("disposed", &self.notifier.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::LangKey;
    use crate::translations::{Languages, TranslationChange, Translations};
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_set_then_get_ignores_case() {
        let languages = Languages::new();
        let translations = Translations::new();
        languages.set("EN", translations.clone());

        assert!(languages.contains("en"));
        assert!(languages.get("en").ptr_eq(&translations));
        assert_eq!(languages.len(), 1);
    }

    #[test]
    fn test_get_creates_default_entry() {
        let languages = Languages::new();
        assert!(languages.try_get("fr").is_none());

        let created = languages.get("fr");
        assert!(created.is_empty());
        assert!(languages.try_get("FR").is_some_and(|t| t.ptr_eq(&created)));
        assert_eq!(created.observer_count(), 1);
    }

    #[test]
    fn test_events_are_tagged_with_key() {
        let languages = Languages::new();
        let mut rx = languages.subscribe();

        languages.get("de").set("hello", "Hallo");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, LangKey::from("de"));
        assert_eq!(
            event.event,
            TranslationChange {
                key: "hello".to_string(),
                translation: Some("Hallo".to_string()),
            }
        );
    }

    #[test]
    fn test_replaced_value_is_no_longer_forwarded() {
        let languages = Languages::new();
        let old = Translations::new();
        let new = Translations::new();
        languages.set("en", old.clone());
        languages.set("en", new.clone());
        let mut rx = languages.subscribe();

        old.set("stale", "x");
        new.set("fresh", "y");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event.key, "fresh");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(old.observer_count(), 0);
        assert_eq!(new.observer_count(), 1);
    }

    #[test]
    fn test_remove_disposes_forwarding() {
        let languages = Languages::new();
        let translations = languages.get("en");
        let mut rx = languages.subscribe();

        languages.remove("EN");
        translations.set("k", "v");

        assert!(!languages.contains("en"));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(translations.observer_count(), 0);
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let languages = Languages::new();
        languages.remove("xx");
        assert!(languages.is_empty());
    }

    #[test]
    fn test_dispose_closes_stream() {
        let languages = Languages::new();
        let translations = languages.get("en");
        let mut rx = languages.subscribe();

        languages.dispose();
        languages.dispose();
        translations.set("after", "dispose");

        assert!(languages.is_disposed());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
        assert!(matches!(languages.subscribe().try_recv(), Err(TryRecvError::Closed)));
    }

    #[test]
    fn test_with_entries_forwards_seeded_values() {
        let en: Translations = [("yes", "yes")].into_iter().collect();
        let languages = Languages::with_entries([(LangKey::from("en"), en.clone())], 8);
        let mut rx = languages.subscribe();

        en.set("no", "no");

        assert_eq!(rx.try_recv().unwrap().key, LangKey::from("EN"));
        assert_eq!(languages.keys(), vec![LangKey::from("en")]);
    }

    #[test]
    fn test_drop_closes_stream() {
        let languages = Languages::new();
        let mut rx = languages.subscribe();
        drop(languages);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }
}
