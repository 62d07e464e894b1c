//! TTL-tracking cache storage over an eviction store.

use std::time::{Duration, Instant};

use crate::eviction::{store_for, EvictionPolicy, EvictionStore};

/// One cached value with its expiry window.
#[derive(Clone, Debug)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) inserted_at: Instant,
    pub(crate) ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// Keyed store with per-entry TTL and a pluggable eviction policy.
pub(crate) struct CacheStore<V> {
    store: Box<dyn EvictionStore<CacheEntry<V>>>,
    max_entries: Option<usize>,
}

impl<V: Clone + Send + 'static> CacheStore<V> {
    pub(crate) fn new(policy: &EvictionPolicy, max_entries: Option<usize>) -> Self {
        Self {
            store: store_for(policy),
            max_entries,
        }
    }

    /// Gets a live value; an expired entry is removed and reads as a miss.
    pub(crate) fn get(&mut self, key: &str) -> Option<V> {
        let expired = self.store.get(key).map(CacheEntry::is_expired)?;
        if expired {
            self.store.remove(key);
            return None;
        }
        self.store.get(key).map(|entry| entry.value.clone())
    }

    /// Inserts a value, then enforces the entry bound (the per-call bound
    /// wins when given). Returns the evicted keys.
    pub(crate) fn insert(
        &mut self,
        key: String,
        value: V,
        ttl: Duration,
        max_entries: Option<usize>,
    ) -> Vec<String> {
        self.store.insert(key, CacheEntry::new(value, ttl));

        let mut evicted = Vec::new();
        if let Some(bound) = max_entries.or(self.max_entries) {
            let bound = bound.max(1);
            while self.store.len() > bound {
                match self.store.evict_one() {
                    Some((victim, _)) => evicted.push(victim),
                    None => break,
                }
            }
        }
        evicted
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    /// Drops every expired entry; returns how many were removed.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.store.len();
        self.store.retain(&mut |_, entry| !entry.is_expired());
        before - self.store.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    pub(crate) fn clear(&mut self) {
        self.store.clear();
    }
}
