//! Thread-safe associative container.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// A generic map that is safe for concurrent use.
///
/// Reads run in parallel; a write excludes every other reader and writer for
/// its duration. Iteration always works on a copy taken under the read lock,
/// so callbacks passed to [`ConcurrentMap::for_each`] never run while the map
/// is locked and may freely call back into it.
#[derive(Debug)]
pub struct ConcurrentMap<K, V> {
    content: RwLock<HashMap<K, V>>,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            content: RwLock::new(HashMap::new()),
        }
    }

    /// Get the value associated to `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.content.read().get(key).cloned()
    }

    /// Check whether `key` has an associated value.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.content.read().contains_key(key)
    }

    /// Associate `value` to `key`, overwriting any existing value.
    pub fn put(&self, key: K, value: V) {
        self.content.write().insert(key, value);
    }

    /// Like [`ConcurrentMap::put`], returning the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.content.write().insert(key, value)
    }

    /// Apply `f` to the value stored under `key` while holding the write lock.
    ///
    /// Returns `None` without calling `f` when the key is absent. The closure
    /// must not touch this map.
    pub fn update<Q, R>(&self, key: &Q, f: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.content.write().get_mut(key).map(f)
    }

    /// Current number of entries.
    pub fn size(&self) -> usize {
        self.content.read().len()
    }

    /// Check whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.content.read().is_empty()
    }

    /// Point-in-time copy of every entry, in no particular order.
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.content
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Apply `f` to every entry of a snapshot.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V))
    where
        K: Clone,
        V: Clone,
    {
        for (k, v) in self.snapshot() {
            f(&k, &v);
        }
    }
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
