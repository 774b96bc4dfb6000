use std::hash::Hash;
use std::time::Duration;

use indexmap::{Equivalent, IndexMap};
use tokio::time::Instant;

use super::CachePolicy;

/// A cached value with its write time and time to live.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub timestamp: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            timestamp: Instant::now(),
            ttl,
        }
    }

    /// An entry stays valid up to and including `timestamp + ttl`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) > self.ttl
    }
}

/// Entries kept in write order, so the front is always the oldest write.
#[derive(Debug)]
pub(crate) struct TimedMap<K, T> {
    entries: IndexMap<K, CacheEntry<T>>,
    policy: CachePolicy,
}

impl<K: Hash + Eq, T> TimedMap<K, T> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: IndexMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&CacheEntry<T>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.entries.get(key)
    }

    /// Writes `value` as the newest entry and returns how many old entries
    /// were evicted to stay within capacity.
    pub fn insert(&mut self, key: K, value: T) -> usize {
        self.entries.shift_remove(&key);
        self.entries
            .insert(key, CacheEntry::new(value, self.policy.ttl));

        let mut evicted = 0;
        while self.entries.len() > self.policy.max_entries {
            self.entries.shift_remove_index(0);
            evicted += 1;
        }
        evicted
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<CacheEntry<T>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.entries.shift_remove(key)
    }

    /// Removes every entry matching `predicate`, returning the count.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&K, &T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !predicate(key, &entry.value));
        before - self.entries.len()
    }

    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
