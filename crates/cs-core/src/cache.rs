//! Small expiring key/value cache.
//!
//! Entries carry their own expiry instant and are checked when read; there is
//! no background eviction. Not synchronized: callers own the cache mutably.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Map of `key -> (value, expiry)`.
#[derive(Debug, Clone)]
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (V, Instant)>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it has not expired.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(value, _)| value)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(key, (value, now + self.ttl));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Returns the cached value or loads, stores and returns a fresh one.
    ///
    /// Loader errors are returned as-is and nothing is cached.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E>
    where
        K: Clone,
    {
        self.get_or_try_insert_at(key, Instant::now(), load)
    }

    fn get_or_try_insert_at<E>(
        &mut self,
        key: K,
        now: Instant,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E>
    where
        K: Clone,
    {
        if self.get_at(&key, now).is_none() {
            let value = load()?;
            self.insert_at(key.clone(), value, now);
        }
        // Present: either still fresh or just inserted.
        Ok(&self.entries[&key].0)
    }
}
