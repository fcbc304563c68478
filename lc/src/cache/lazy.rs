//! LazyCache - concurrent map of deferred, memoized values

use std::borrow::Borrow;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use super::cell::LazyCell;

/// Concurrent key -> lazily computed value map
///
/// Each slot holds a [`LazyCell`] rather than a plain value, so the factory
/// for a key executes at most once per cell even when many threads race on
/// the same key. Factories always run outside the map's shard locks.
pub struct LazyCache<K, V> {
    map: DashMap<K, Arc<LazyCell<V>>>,
}

/// A cell taken out of the cache by [`LazyCache::try_remove`]
///
/// Lets the caller decide on cleanup without forcing a computation that
/// never happened.
pub struct Removed<V> {
    cell: Arc<LazyCell<V>>,
}

impl<V: Clone> Removed<V> {
    /// True if the removed cell had produced its value
    pub fn is_computed(&self) -> bool {
        self.cell.is_computed()
    }

    /// The removed value, if it had been computed
    pub fn value(&self) -> Option<V> {
        self.cell.get()
    }

    /// The removed value once any in-flight computation has settled.
    ///
    /// Returns `None` for a cell that never produced a value.
    pub fn settled(&self) -> Option<V> {
        self.cell.wait()
    }
}

impl<V> fmt::Debug for Removed<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Removed").field("cell", &self.cell).finish()
    }
}

impl<K, V> LazyCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Return the value for `key`, computing it with `factory` on first access
    pub fn get_or_add(&self, key: K, factory: impl FnOnce(&K) -> V) -> V {
        match self.try_get_or_add(key, |key| Ok::<_, Infallible>(factory(key))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`LazyCache::get_or_add`].
    ///
    /// A failed (or panicking) factory is not memoized: its slot is removed,
    /// and the next caller runs its own factory.
    pub fn try_get_or_add<E>(&self, key: K, factory: impl FnOnce(&K) -> Result<V, E>) -> Result<V, E> {
        let cell = loop {
            match self.map.entry(key.clone()) {
                Entry::Occupied(slot) => {
                    let cell = Arc::clone(slot.get());
                    // Claimed under the shard lock so eviction cannot race it
                    if cell.try_claim() {
                        break cell;
                    }
                    drop(slot);
                    if let Some(value) = cell.wait() {
                        return Ok(value);
                    }
                    // The computation we waited on failed; look the key up again
                }
                Entry::Vacant(slot) => {
                    trace!("try_get_or_add: installing new cell");
                    let cell = Arc::new(LazyCell::claimed());
                    slot.insert(Arc::clone(&cell));
                    break cell;
                }
            }
        };

        let _evict = EvictOnFailure {
            map: &self.map,
            key: &key,
            cell: &cell,
        };
        cell.run(|| factory(&key))
    }

    /// Insert a value computed by `add`, or replace the existing one with `update`.
    ///
    /// `update` receives the previous value: immediately if it was computed,
    /// or once its in-flight computation settles. A previous cell that never
    /// produced a value is treated as absent and `add` is used instead.
    /// Callers racing on the replacement cell wait for this computation.
    pub fn add_or_update(&self, key: K, add: impl FnOnce(&K) -> V, update: impl FnOnce(&K, V) -> V) -> V {
        let cell = Arc::new(LazyCell::claimed());
        let previous = self.map.insert(key.clone(), Arc::clone(&cell));
        let _evict = EvictOnFailure {
            map: &self.map,
            key: &key,
            cell: &cell,
        };
        let result = cell.run(|| {
            let value = match previous.and_then(|previous| previous.wait()) {
                Some(previous) => update(&key, previous),
                None => add(&key),
            };
            Ok::<_, Infallible>(value)
        });
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Look up the value for `key` without creating a slot.
    ///
    /// Waits if the value is being computed; `None` if absent or empty.
    pub fn try_get_value<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let cell = self.map.get(key).map(|slot| Arc::clone(slot.value()))?;
        cell.wait()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Remove the slot for `key`, handing back its memoization state
    pub fn try_remove<Q>(&self, key: &Q) -> Option<Removed<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).map(|(_, cell)| Removed { cell })
    }

    /// Remove the slot for `key` only if it holds a computed value matching `predicate`
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map
            .remove_if(key, |_, cell| cell.get().is_some_and(|value| predicate(&value)))
            .is_some()
    }

    /// Snapshot of the keys that currently have a slot
    pub fn keys(&self) -> Vec<K> {
        self.map.iter().map(|slot| slot.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

/// Removes a claimed cell from the map if its computation ends without a value
struct EvictOnFailure<'a, K: Eq + Hash, V> {
    map: &'a DashMap<K, Arc<LazyCell<V>>>,
    key: &'a K,
    cell: &'a Arc<LazyCell<V>>,
}

impl<K: Eq + Hash, V> Drop for EvictOnFailure<'_, K, V> {
    fn drop(&mut self) {
        // Only the exact cell, and only while nobody has claimed it again
        let evicted = self
            .map
            .remove_if(self.key, |_, cell| Arc::ptr_eq(cell, self.cell) && cell.is_idle());
        if evicted.is_some() {
            trace!("EvictOnFailure: removed empty cell");
        }
    }
}

impl<K, V> Default for LazyCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for LazyCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(key, value)| (key, Arc::new(LazyCell::ready(value))))
            .collect();
        Self { map }
    }
}

impl<K: Eq + Hash, V> fmt::Debug for LazyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCache").field("len", &self.map.len()).finish()
    }
}
