//! Translations - one language's key -> text table
//!
//! A shared handle: clones point at the same table, and every mutation is
//! published to the table's observers as a [`TranslationChange`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::key::LangKey;
use crate::observe::{Observable, Observer, ObserverSet, Subscription};
use crate::registry::{KeyedEvent, Registry};

/// A single entry of a translation table changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationChange {
    /// Translation key that changed
    pub key: String,
    /// New text, or `None` if the key was removed
    pub translation: Option<String>,
}

/// Registry of translation tables keyed by language
pub type Languages = Registry<LangKey, Translations>;

/// A translation change tagged with its language
pub type LanguageChange = KeyedEvent<LangKey, TranslationChange>;

struct Table {
    entries: RwLock<HashMap<String, String>>,
    observers: ObserverSet<TranslationChange>,
}

/// Shared, observable table of translated strings for one language
///
/// Clones share the same table. `set` and `remove` notify observers while
/// the table is still write-locked, so observers see changes in mutation
/// order but must not read this table from inside their callback.
#[derive(Clone)]
pub struct Translations {
    table: Arc<Table>,
}

impl Translations {
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    pub fn from_map(entries: HashMap<String, String>) -> Self {
        Self {
            table: Arc::new(Table {
                entries: RwLock::new(entries),
                observers: ObserverSet::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.table.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.entries.read().contains_key(key)
    }

    /// Set the text for `key` and notify observers
    pub fn set(&self, key: impl Into<String>, translation: impl Into<String>) {
        let key = key.into();
        let translation = translation.into();
        let mut entries = self.table.entries.write();
        entries.insert(key.clone(), translation.clone());
        self.table.observers.notify(&TranslationChange {
            key,
            translation: Some(translation),
        });
    }

    /// Remove `key`, notifying observers only if it was present
    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = self.table.entries.write();
        let removed = entries.remove(key)?;
        self.table.observers.notify(&TranslationChange {
            key: key.to_string(),
            translation: None,
        });
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.table.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if both handles refer to the same table
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }

    /// Number of observers currently attached
    pub fn observer_count(&self) -> usize {
        self.table.observers.len()
    }
}

impl Default for Translations {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Translations {
    type Event = TranslationChange;

    fn subscribe(&self, observer: Observer<TranslationChange>) -> Subscription {
        self.table.observers.subscribe(observer)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Translations {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Debug for Translations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translations")
            .field("len", &self.len())
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(events: &Arc<Mutex<Vec<TranslationChange>>>) -> Observer<TranslationChange> {
        let events = Arc::clone(events);
        Box::new(move |change: &TranslationChange| events.lock().unwrap().push(change.clone()))
    }

    #[test]
    fn test_set_and_get() {
        let translations = Translations::new();
        translations.set("greeting", "Hello");
        assert_eq!(translations.get("greeting").as_deref(), Some("Hello"));
        assert!(translations.contains("greeting"));
        assert_eq!(translations.len(), 1);
    }

    #[test]
    fn test_mutations_are_published_in_order() {
        let translations: Translations = [("a", "1")].into_iter().collect();
        let events = Arc::new(Mutex::new(Vec::new()));
        let _subscription = translations.subscribe(recording(&events));

        translations.set("a", "2");
        translations.set("b", "3");
        assert_eq!(translations.remove("a").as_deref(), Some("2"));
        assert_eq!(translations.remove("missing"), None);

        let events = events.lock().unwrap();
        let keys: Vec<_> = events.iter().map(|e| (e.key.as_str(), e.translation.as_deref())).collect();
        assert_eq!(keys, vec![("a", Some("2")), ("b", Some("3")), ("a", None)]);
    }

    #[test]
    fn test_clones_share_table() {
        let translations = Translations::new();
        let clone = translations.clone();
        clone.set("k", "v");
        assert_eq!(translations.get("k").as_deref(), Some("v"));
        assert!(translations.ptr_eq(&clone));
        assert!(!translations.ptr_eq(&Translations::new()));
    }
}
