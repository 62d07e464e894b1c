//! Cache configuration: feature-level settings and per-call options.

use std::time::Duration;

use reqpipe_core::{EventListeners, FnListener};

use crate::events::CacheEvent;
use crate::eviction::EvictionPolicy;
use crate::keys::KeyStrategy;

pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// How a cache hit is materialised for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClonePolicy {
    /// Hand back the stored allocation itself.
    #[default]
    Shared,
    /// Hand back a structural copy. Kept as an accepted alias of `Deep`;
    /// responses have no interior sharing for the two to differ over.
    Shallow,
    /// Hand back a structural copy.
    Deep,
}

/// Per-call cache options.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Entry lifetime; defaults to five minutes.
    pub ttl: Duration,
    /// Explicit key, bypassing the key strategy.
    pub key: Option<String>,
    pub clone_policy: ClonePolicy,
    /// Entry bound enforced after this insert; overrides the feature-level
    /// bound when set.
    pub max_entries: Option<usize>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            key: None,
            clone_policy: ClonePolicy::default(),
            max_entries: None,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn clone_policy(mut self, policy: ClonePolicy) -> Self {
        self.clone_policy = policy;
        self
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }
}

/// Feature-level cache settings, fixed at construction.
#[derive(Clone)]
pub struct CacheSettings {
    pub(crate) key_strategy: KeyStrategy,
    pub(crate) eviction: EvictionPolicy,
    pub(crate) max_entries: Option<usize>,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
}

impl CacheSettings {
    pub fn builder() -> CacheSettingsBuilder {
        CacheSettingsBuilder::new()
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`CacheSettings`].
pub struct CacheSettingsBuilder {
    key_strategy: KeyStrategy,
    eviction: EvictionPolicy,
    max_entries: Option<usize>,
    event_listeners: EventListeners<CacheEvent>,
}

impl CacheSettingsBuilder {
    pub fn new() -> Self {
        Self {
            key_strategy: KeyStrategy::default(),
            eviction: EvictionPolicy::default(),
            max_entries: None,
            event_listeners: EventListeners::new(),
        }
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn eviction(mut self, policy: EvictionPolicy) -> Self {
        self.eviction = policy;
        self
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Hit { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Miss { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Eviction { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    pub fn build(self) -> CacheSettings {
        CacheSettings {
            key_strategy: self.key_strategy,
            eviction: self.eviction,
            max_entries: self.max_entries,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for CacheSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
