//! Cache eviction policies.
//!
//! Capacity enforcement is separated from insertion: stores insert without
//! evicting and surrender victims one at a time through
//! [`EvictionStore::evict_one`], which lets the per-call entry bound differ
//! from the store-wide one.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Selector for [`EvictionPolicy::Custom`]: given the candidate keys in
/// insertion order, names the victim.
pub type VictimSelector = Arc<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

/// Which entry to sacrifice when the cache is over capacity.
#[derive(Clone, Default)]
pub enum EvictionPolicy {
    /// Least recently used entry goes first.
    Lru,
    /// Oldest insertion goes first.
    #[default]
    Fifo,
    /// Never evicts on capacity; entries only leave by TTL expiry.
    TimeBased,
    /// User-supplied victim selection.
    Custom(VictimSelector),
}

impl fmt::Debug for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Lru => f.write_str("Lru"),
            EvictionPolicy::Fifo => f.write_str("Fifo"),
            EvictionPolicy::TimeBased => f.write_str("TimeBased"),
            EvictionPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Storage with policy-specific victim selection.
pub(crate) trait EvictionStore<V>: Send {
    /// Gets a value, updating any recency bookkeeping.
    fn get(&mut self, key: &str) -> Option<&V>;

    /// Inserts or replaces a value. Never evicts.
    fn insert(&mut self, key: String, value: V);

    /// Removes a specific key.
    fn remove(&mut self, key: &str) -> Option<V>;

    /// Surrenders the policy's victim, if the policy evicts at all.
    fn evict_one(&mut self) -> Option<(String, V)>;

    /// Keeps only the entries the predicate approves.
    fn retain(&mut self, predicate: &mut dyn FnMut(&str, &V) -> bool);

    fn len(&self) -> usize;

    fn clear(&mut self);
}

/// LRU storage backed by the `lru` crate.
pub(crate) struct LruStore<V> {
    cache: lru::LruCache<String, V>,
}

impl<V> LruStore<V> {
    pub(crate) fn new() -> Self {
        Self {
            cache: lru::LruCache::unbounded(),
        }
    }
}

impl<V: Send> EvictionStore<V> for LruStore<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        self.cache.get(key)
    }

    fn insert(&mut self, key: String, value: V) {
        self.cache.put(key, value);
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        self.cache.pop(key)
    }

    fn evict_one(&mut self) -> Option<(String, V)> {
        self.cache.pop_lru()
    }

    fn retain(&mut self, predicate: &mut dyn FnMut(&str, &V) -> bool) {
        let doomed: Vec<String> = self
            .cache
            .iter()
            .filter(|(k, v)| !predicate(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.cache.pop(&key);
        }
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn clear(&mut self) {
        self.cache.clear();
    }
}

/// FIFO storage: a map plus insertion order.
pub(crate) struct FifoStore<V> {
    data: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V> FifoStore<V> {
    pub(crate) fn new() -> Self {
        Self {
            data: HashMap::new(),
            order: VecDeque::new(),
        }
    }
}

impl<V: Send> EvictionStore<V> for FifoStore<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        self.data.get(key)
    }

    fn insert(&mut self, key: String, value: V) {
        if self.data.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        self.order.retain(|k| k != key);
        self.data.remove(key)
    }

    fn evict_one(&mut self) -> Option<(String, V)> {
        while let Some(key) = self.order.pop_front() {
            if let Some(value) = self.data.remove(&key) {
                return Some((key, value));
            }
        }
        None
    }

    fn retain(&mut self, predicate: &mut dyn FnMut(&str, &V) -> bool) {
        let data = &mut self.data;
        let mut keep = |k: &str| -> bool {
            match data.get(k) {
                Some(v) => predicate(k, v),
                None => false,
            }
        };
        let doomed: Vec<String> = self
            .order
            .iter()
            .filter(|k| !keep(k))
            .cloned()
            .collect();
        for key in doomed {
            self.order.retain(|k| k != &key);
            self.data.remove(&key);
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
        self.order.clear();
    }
}

/// TTL-only storage: capacity pressure never evicts.
pub(crate) struct TimeBasedStore<V> {
    data: HashMap<String, V>,
}

impl<V> TimeBasedStore<V> {
    pub(crate) fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }
}

impl<V: Send> EvictionStore<V> for TimeBasedStore<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        self.data.get(key)
    }

    fn insert(&mut self, key: String, value: V) {
        self.data.insert(key, value);
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        self.data.remove(key)
    }

    fn evict_one(&mut self) -> Option<(String, V)> {
        None
    }

    fn retain(&mut self, predicate: &mut dyn FnMut(&str, &V) -> bool) {
        self.data.retain(|k, v| predicate(k, v));
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }
}

/// Storage with a user-supplied victim selector.
pub(crate) struct CustomStore<V> {
    data: HashMap<String, V>,
    order: Vec<String>,
    selector: VictimSelector,
}

impl<V> CustomStore<V> {
    pub(crate) fn new(selector: VictimSelector) -> Self {
        Self {
            data: HashMap::new(),
            order: Vec::new(),
            selector,
        }
    }
}

impl<V: Send> EvictionStore<V> for CustomStore<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        self.data.get(key)
    }

    fn insert(&mut self, key: String, value: V) {
        if self.data.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }

    fn remove(&mut self, key: &str) -> Option<V> {
        self.order.retain(|k| k != key);
        self.data.remove(key)
    }

    fn evict_one(&mut self) -> Option<(String, V)> {
        let victim = (self.selector)(&self.order)?;
        self.order.retain(|k| k != &victim);
        let value = self.data.remove(&victim)?;
        Some((victim, value))
    }

    fn retain(&mut self, predicate: &mut dyn FnMut(&str, &V) -> bool) {
        let data = &mut self.data;
        self.order.retain(|k| {
            let keep = data.get(k.as_str()).is_some_and(|v| predicate(k, v));
            if !keep {
                data.remove(k.as_str());
            }
            keep
        });
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
        self.order.clear();
    }
}

pub(crate) fn store_for<V: Send + 'static>(policy: &EvictionPolicy) -> Box<dyn EvictionStore<V>> {
    match policy {
        EvictionPolicy::Lru => Box::new(LruStore::new()),
        EvictionPolicy::Fifo => Box::new(FifoStore::new()),
        EvictionPolicy::TimeBased => Box::new(TimeBasedStore::new()),
        EvictionPolicy::Custom(selector) => Box::new(CustomStore::new(Arc::clone(selector))),
    }
}
