//! Request coalescing for the reqpipe runtime.
//!
//! Concurrent requests that hash to the same idempotency key collapse onto a
//! single transport call: the first caller leads, later callers attach to the
//! leader's in-flight result, and a settled result keeps answering callers
//! until its TTL lapses. Failures are never cached — a failed leader's error
//! reaches the waiters that were already attached, and the next caller leads
//! a fresh attempt.
//!
//! The pending entry is installed inside one non-suspending critical section
//! before the leader first awaits, so at any instant a key has at most one
//! in-flight transport call.

mod config;
mod key;

pub use config::{
    DuplicateCallback, HashAlgorithm, IdempotentOptions, DEFAULT_IDEMPOTENT_METHODS,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;
use reqpipe_core::{Method, RequestConfig, RequestError, RequestExecutor, Response};
use tokio::sync::broadcast;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Point-in-time coalescing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IdempotentStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub pending_reused: u64,
    pub duplicates_blocked: u64,
    pub actual_network_requests: u64,
    /// `duplicates_blocked / total_requests * 100`.
    pub duplicate_rate: f64,
    pub avg_response_time: Duration,
    pub avg_key_generation_time: Duration,
}

type Settled = Result<Arc<Response>, RequestError>;

struct PendingEntry {
    sender: broadcast::Sender<Settled>,
    origin: RequestConfig,
}

struct CachedResult {
    value: Arc<Response>,
    inserted_at: Instant,
    ttl: Duration,
}

impl CachedResult {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

#[derive(Default)]
struct IdemMaps {
    pending: HashMap<String, PendingEntry>,
    results: HashMap<String, CachedResult>,
}

#[derive(Default)]
struct IdemState {
    maps: Mutex<IdemMaps>,
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    pending_reused: AtomicU64,
    duplicates_blocked: AtomicU64,
    actual_network_requests: AtomicU64,
    response_time_micros: AtomicU64,
    response_samples: AtomicU64,
    keygen_nanos: AtomicU64,
    keygen_samples: AtomicU64,
}

/// Removes a leader's pending entry if the leader is dropped before settling,
/// which closes the channel and fails attached waiters instead of hanging
/// them.
struct PendingGuard {
    state: Arc<IdemState>,
    key: Option<String>,
}

impl PendingGuard {
    fn disarm(&mut self) -> Option<String> {
        self.key.take()
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.state.maps.lock().pending.remove(&key);
        }
    }
}

enum Role {
    Cached(Arc<Response>),
    Waiter(broadcast::Receiver<Settled>, RequestConfig),
    Leader,
}

/// Coalesces duplicate requests onto one in-flight transport call per key.
pub struct IdempotencyFeature {
    executor: Arc<RequestExecutor>,
    methods: parking_lot::RwLock<Vec<Method>>,
    state: Arc<IdemState>,
}

impl IdempotencyFeature {
    /// A feature coalescing the default method set {GET, PUT, DELETE}.
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self::with_methods(executor, DEFAULT_IDEMPOTENT_METHODS.to_vec())
    }

    pub fn with_methods(executor: Arc<RequestExecutor>, methods: Vec<Method>) -> Self {
        Self {
            executor,
            methods: parking_lot::RwLock::new(methods),
            state: Arc::new(IdemState::default()),
        }
    }

    pub fn methods(&self) -> Vec<Method> {
        self.methods.read().clone()
    }

    /// Replaces the coalesced method set; in-flight requests keep the set
    /// they started with.
    pub fn set_methods(&self, methods: Vec<Method>) {
        *self.methods.write() = methods;
    }

    /// Sends through the coalescing layer. Methods outside the configured set
    /// bypass it entirely.
    pub async fn request_idempotent(
        &self,
        config: RequestConfig,
        options: &IdempotentOptions,
    ) -> Settled {
        self.state.total_requests.fetch_add(1, Ordering::Relaxed);

        if !self.methods.read().contains(&config.method) {
            self.state
                .actual_network_requests
                .fetch_add(1, Ordering::Relaxed);
            return self.executor.execute(config).await.map(Arc::new);
        }

        let keygen_started = Instant::now();
        let key = key::derive_key(&config, options);
        self.state
            .keygen_nanos
            .fetch_add(keygen_started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        self.state.keygen_samples.fetch_add(1, Ordering::Relaxed);

        // Result lookup, pending lookup and pending install happen in one
        // non-suspending critical section.
        let role = {
            let mut maps = self.state.maps.lock();
            let cached = match maps.results.get(&key) {
                Some(entry) if !entry.is_expired() => Some(Arc::clone(&entry.value)),
                Some(_) => {
                    maps.results.remove(&key);
                    None
                }
                None => None,
            };
            match cached {
                Some(value) => Role::Cached(value),
                None => match maps.pending.get(&key) {
                    Some(entry) => Role::Waiter(entry.sender.subscribe(), entry.origin.clone()),
                    None => {
                        let (sender, _rx) = broadcast::channel(1);
                        maps.pending.insert(
                            key.clone(),
                            PendingEntry {
                                sender,
                                origin: config.clone(),
                            },
                        );
                        Role::Leader
                    }
                },
            }
        };

        match role {
            Role::Cached(value) => {
                self.state.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.state.duplicates_blocked.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                counter!("reqpipe_idempotent_cache_hits_total").increment(1);
                tracing::debug!(key = %key, "idempotent result served from cache");
                Ok(value)
            }
            Role::Waiter(mut receiver, origin) => {
                self.state.pending_reused.fetch_add(1, Ordering::Relaxed);
                self.state.duplicates_blocked.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                counter!("reqpipe_idempotent_coalesced_total").increment(1);
                tracing::debug!(key = %key, "request coalesced onto in-flight leader");

                if let Some(callback) = &options.on_duplicate {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        callback(&origin, &config)
                    }));
                    if result.is_err() {
                        tracing::warn!(key = %key, "on_duplicate callback panicked");
                    }
                }

                match receiver.recv().await {
                    Ok(settled) => settled,
                    Err(_) => Err(RequestError::concurrent(
                        "coalesced leader was cancelled before completing",
                    )),
                }
            }
            Role::Leader => {
                self.state
                    .actual_network_requests
                    .fetch_add(1, Ordering::Relaxed);
                let mut guard = PendingGuard {
                    state: Arc::clone(&self.state),
                    key: Some(key),
                };

                let started = Instant::now();
                let result = self.executor.execute(config).await.map(Arc::new);
                self.state
                    .response_time_micros
                    .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
                self.state.response_samples.fetch_add(1, Ordering::Relaxed);

                let key = match guard.disarm() {
                    Some(key) => key,
                    // Unreachable: nothing else disarms the guard.
                    None => return result,
                };

                let entry = {
                    let mut maps = self.state.maps.lock();
                    let entry = maps.pending.remove(&key);
                    if let Ok(value) = &result {
                        maps.results.insert(
                            key,
                            CachedResult {
                                value: Arc::clone(value),
                                inserted_at: Instant::now(),
                                ttl: options.ttl,
                            },
                        );
                    }
                    entry
                };

                if let Some(entry) = entry {
                    // No receivers is fine; send only fails when nobody joined.
                    let _ = entry.sender.send(clone_settled(&result));
                }
                result
            }
        }
    }

    /// Removes one settled result, or all of them. Pending leaders are left
    /// to finish. Returns whether anything was removed.
    pub fn clear(&self, key: Option<&str>) -> bool {
        let mut maps = self.state.maps.lock();
        match key {
            Some(key) => maps.results.remove(key).is_some(),
            None => {
                let had_results = !maps.results.is_empty();
                maps.results.clear();
                had_results
            }
        }
    }

    pub fn stats(&self) -> IdempotentStats {
        let total = self.state.total_requests.load(Ordering::Relaxed);
        let blocked = self.state.duplicates_blocked.load(Ordering::Relaxed);
        let response_samples = self.state.response_samples.load(Ordering::Relaxed);
        let keygen_samples = self.state.keygen_samples.load(Ordering::Relaxed);

        IdempotentStats {
            total_requests: total,
            cache_hits: self.state.cache_hits.load(Ordering::Relaxed),
            pending_reused: self.state.pending_reused.load(Ordering::Relaxed),
            duplicates_blocked: blocked,
            actual_network_requests: self.state.actual_network_requests.load(Ordering::Relaxed),
            duplicate_rate: if total == 0 {
                0.0
            } else {
                blocked as f64 / total as f64 * 100.0
            },
            avg_response_time: if response_samples == 0 {
                Duration::ZERO
            } else {
                Duration::from_micros(
                    self.state.response_time_micros.load(Ordering::Relaxed) / response_samples,
                )
            },
            avg_key_generation_time: if keygen_samples == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(
                    self.state.keygen_nanos.load(Ordering::Relaxed) / keygen_samples,
                )
            },
        }
    }
}

fn clone_settled(settled: &Settled) -> Settled {
    match settled {
        Ok(value) => Ok(Arc::clone(value)),
        Err(error) => Err(error.clone()),
    }
}
