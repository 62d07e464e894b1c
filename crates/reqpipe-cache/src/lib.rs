//! TTL-bounded response caching for the reqpipe runtime.
//!
//! The cache feature wraps the [`RequestExecutor`]: a request whose key maps
//! to a live entry is answered from the store without touching the transport;
//! a miss executes and, on success, inserts the response under the derived
//! key. Keys come from a pluggable [`KeyStrategy`], capacity pressure is
//! resolved by a pluggable [`EvictionPolicy`], and a background sweeper
//! removes expired entries every five minutes.
//!
//! Caching alone does not coalesce concurrent misses; the idempotency
//! feature owns that guarantee.
//!
//! # Example
//!
//! ```no_run
//! use reqpipe_cache::{CacheFeature, CacheOptions};
//! use std::time::Duration;
//!
//! # async fn example(executor: std::sync::Arc<reqpipe_core::RequestExecutor>) {
//! let cache = CacheFeature::new(executor);
//! let options = CacheOptions::new().ttl(Duration::from_secs(30));
//!
//! let config = reqpipe_core::RequestConfig::get("https://api.example.com/catalog");
//! let first = cache.request_with_cache(config.clone(), &options).await;
//! let second = cache.request_with_cache(config, &options).await; // served from the store
//! # let _ = (first, second);
//! # }
//! ```

mod config;
mod events;
mod eviction;
mod keys;
mod store;

pub use config::{CacheOptions, CacheSettings, CacheSettingsBuilder, ClonePolicy};
pub use events::CacheEvent;
pub use eviction::{EvictionPolicy, VictimSelector};
pub use keys::KeyStrategy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqpipe_core::{RequestConfig, RequestError, RequestExecutor, Response};
use store::CacheStore;
use tokio::task::JoinHandle;

#[cfg(feature = "metrics")]
use metrics::counter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub swept: u64,
    pub entries: usize,
}

struct CacheState {
    store: Mutex<CacheStore<Arc<Response>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    swept: AtomicU64,
}

/// Response cache wrapping the executor.
pub struct CacheFeature {
    executor: Arc<RequestExecutor>,
    settings: CacheSettings,
    state: Arc<CacheState>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheFeature {
    /// A cache with the default settings: parameterized keys, FIFO eviction,
    /// no entry bound.
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self::with_settings(executor, CacheSettings::default())
    }

    pub fn with_settings(executor: Arc<RequestExecutor>, settings: CacheSettings) -> Self {
        let store = CacheStore::new(&settings.eviction, settings.max_entries);
        Self {
            executor,
            settings,
            state: Arc::new(CacheState {
                store: Mutex::new(store),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                swept: AtomicU64::new(0),
            }),
            sweeper: Mutex::new(None),
        }
    }

    /// Sends through the cache. A live entry answers without a transport
    /// call; a miss executes and stores the successful response.
    ///
    /// The returned `Arc` is the stored allocation itself under
    /// [`ClonePolicy::Shared`], and a fresh copy otherwise.
    pub async fn request_with_cache(
        &self,
        config: RequestConfig,
        options: &CacheOptions,
    ) -> Result<Arc<Response>, RequestError> {
        self.ensure_sweeper();

        let key = match &options.key {
            Some(key) => key.clone(),
            None => self.settings.key_strategy.key_for(&config),
        };

        // Lookup happens in one non-suspending critical section.
        let cached = self.state.store.lock().get(&key);
        if let Some(value) = cached {
            self.state.hits.fetch_add(1, Ordering::Relaxed);
            self.settings.event_listeners.emit(&CacheEvent::Hit {
                key: key.clone(),
                timestamp: Instant::now(),
            });
            #[cfg(feature = "metrics")]
            counter!("reqpipe_cache_hits_total").increment(1);
            tracing::debug!(key = %key, "cache hit");
            return Ok(materialize(value, options.clone_policy));
        }

        self.state.misses.fetch_add(1, Ordering::Relaxed);
        self.settings.event_listeners.emit(&CacheEvent::Miss {
            key: key.clone(),
            timestamp: Instant::now(),
        });
        #[cfg(feature = "metrics")]
        counter!("reqpipe_cache_misses_total").increment(1);

        let response = Arc::new(self.executor.execute(config).await?);

        let evicted = self.state.store.lock().insert(
            key,
            Arc::clone(&response),
            options.ttl,
            options.max_entries,
        );
        for victim in evicted {
            self.state.evictions.fetch_add(1, Ordering::Relaxed);
            self.settings.event_listeners.emit(&CacheEvent::Eviction {
                key: victim,
                timestamp: Instant::now(),
            });
            #[cfg(feature = "metrics")]
            counter!("reqpipe_cache_evictions_total").increment(1);
        }

        Ok(response)
    }

    /// Removes one entry, or everything when no key is given. Returns whether
    /// anything was removed.
    pub fn clear(&self, key: Option<&str>) -> bool {
        let mut store = self.state.store.lock();
        match key {
            Some(key) => store.remove(key),
            None => {
                let had_entries = store.len() > 0;
                store.clear();
                had_entries
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.state.hits.load(Ordering::Relaxed),
            misses: self.state.misses.load(Ordering::Relaxed),
            evictions: self.state.evictions.load(Ordering::Relaxed),
            swept: self.state.swept.load(Ordering::Relaxed),
            entries: self.state.store.lock().len(),
        }
    }

    /// Stops the sweeper and drops every entry. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.state.store.lock().clear();
    }

    /// Spawns the background sweeper on first use; requests are always issued
    /// from an async context, so the spawn is safe here.
    fn ensure_sweeper(&self) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let state = Arc::downgrade(&self.state);
        let listeners = self.settings.event_listeners.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                let Some(state) = state.upgrade() else { break };
                let removed = state.store.lock().sweep();
                if removed > 0 {
                    state.swept.fetch_add(removed as u64, Ordering::Relaxed);
                    listeners.emit(&CacheEvent::Swept {
                        removed,
                        timestamp: Instant::now(),
                    });
                }
            }
        }));
    }
}

impl Drop for CacheFeature {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

fn materialize(value: Arc<Response>, policy: ClonePolicy) -> Arc<Response> {
    match policy {
        ClonePolicy::Shared => value,
        ClonePolicy::Shallow | ClonePolicy::Deep => Arc::new((*value).clone()),
    }
}
