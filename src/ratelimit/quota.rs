//! Per-(identity, route) quota storage.

use std::fmt;

use super::rate::Limit;
use crate::concurrent::ConcurrentMap;

/// Composite key identifying one quota entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    /// The caller
    pub identity: String,
    /// The rate limited route
    pub route: String,
}

impl QuotaKey {
    /// Create a new quota key.
    pub fn new(identity: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            route: route.into(),
        }
    }
}

impl fmt::Display for QuotaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identity, self.route)
    }
}

/// Result of an atomic check-and-decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// One unit was taken; `remaining` is what is left.
    Consumed { remaining: u32 },
    /// The entry exists but is at zero. Nothing changed.
    Exhausted,
    /// No entry for this key.
    Missing,
}

/// Remaining quota for every (identity, route) pair.
///
/// Entries are created up front and never removed. Every operation touches a
/// single entry under one lock acquisition, so decrements and refills on the
/// same entry compose without lost updates.
#[derive(Debug, Default)]
pub struct QuotaTable {
    entries: ConcurrentMap<QuotaKey, u32>,
}

impl QuotaTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an entry.
    pub(crate) fn seed(&self, key: QuotaKey, quota: u32) {
        self.entries.put(key, quota);
    }

    /// Current quota, or `None` if the identity or route is unknown.
    pub fn get(&self, identity: &str, route: &str) -> Option<u32> {
        self.entries.get(&QuotaKey::new(identity, route))
    }

    /// Decrement by one, floored at zero. Unknown keys are ignored.
    pub fn decrement(&self, identity: &str, route: &str) {
        self.entries
            .update(&QuotaKey::new(identity, route), |quota| {
                *quota = quota.saturating_sub(1);
            });
    }

    /// Take one unit if the entry exists and is non-zero.
    pub fn try_consume(&self, identity: &str, route: &str) -> Consumption {
        self.entries
            .update(&QuotaKey::new(identity, route), |quota| {
                if *quota == 0 {
                    Consumption::Exhausted
                } else {
                    *quota -= 1;
                    Consumption::Consumed { remaining: *quota }
                }
            })
            .unwrap_or(Consumption::Missing)
    }

    /// Apply one refill tick of `limit` to an entry.
    ///
    /// Returns the new quota, or `None` if the entry does not exist.
    pub fn replenish(&self, identity: &str, route: &str, limit: &Limit) -> Option<u32> {
        self.entries
            .update(&QuotaKey::new(identity, route), |quota| {
                *quota = limit.replenish(*quota);
                *quota
            })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    /// Check whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
