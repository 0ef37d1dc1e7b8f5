//! Thread-safe uniqueness container.

use std::borrow::Borrow;
use std::hash::Hash;

use super::map::ConcurrentMap;

/// A set of unique values that is safe for concurrent use.
///
/// Built on [`ConcurrentMap`], so it shares the same locking and
/// copy-then-iterate guarantees.
#[derive(Debug)]
pub struct ConcurrentSet<V> {
    content: ConcurrentMap<V, ()>,
}

impl<V> ConcurrentSet<V>
where
    V: Eq + Hash,
{
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            content: ConcurrentMap::new(),
        }
    }

    /// Check whether `value` belongs to the set.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        V: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.content.contains_key(value)
    }

    /// Store `value` in the set.
    ///
    /// Returns `true` if the value was not already present.
    pub fn put(&self, value: V) -> bool {
        self.content.insert(value, ()).is_none()
    }

    /// Current number of values.
    pub fn size(&self) -> usize {
        self.content.size()
    }

    /// Check whether the set holds no values.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Point-in-time copy of every value, in no particular order.
    pub fn snapshot(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.content.snapshot().into_iter().map(|(v, _)| v).collect()
    }

    /// Apply `f` to every value of a snapshot.
    pub fn for_each(&self, mut f: impl FnMut(&V))
    where
        V: Clone,
    {
        for value in self.snapshot() {
            f(&value);
        }
    }
}

impl<V> Default for ConcurrentSet<V>
where
    V: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<V> for ConcurrentSet<V>
where
    V: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let set = Self::new();
        for value in iter {
            set.put(value);
        }
        set
    }
}
