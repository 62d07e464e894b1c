//! Idempotency options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqpipe_core::{Method, RequestConfig};

pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Methods coalesced by default: safe to collapse because re-sending them is
/// semantically a no-op.
pub const DEFAULT_IDEMPOTENT_METHODS: [Method; 3] = [Method::Get, Method::Put, Method::Delete];

/// Digest used over the canonical request description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// 64-bit FNV-1a; fast and collision-resistant enough for keys.
    #[default]
    Fnv1a,
    /// SHA-256 when callers want collision resistance over speed.
    Sha256,
    /// Lexicographic fallback digest.
    Simple,
}

/// Callback invoked when a duplicate request attaches to an in-flight leader.
/// Receives the leader's config and the duplicate's config.
pub type DuplicateCallback = Arc<dyn Fn(&RequestConfig, &RequestConfig) + Send + Sync>;

/// Per-call coalescing options.
#[derive(Clone)]
pub struct IdempotentOptions {
    /// How long a settled result answers later callers. Defaults to 30s.
    pub ttl: Duration,
    /// Explicit key, bypassing derivation.
    pub key: Option<String>,
    /// Header names folded into the key (ignored under `include_all_headers`).
    pub include_headers: Vec<String>,
    /// Fold every header into the key.
    pub include_all_headers: bool,
    pub hash_algorithm: HashAlgorithm,
    pub on_duplicate: Option<DuplicateCallback>,
}

impl Default for IdempotentOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            key: None,
            include_headers: Vec::new(),
            include_all_headers: false,
            hash_algorithm: HashAlgorithm::default(),
            on_duplicate: None,
        }
    }
}

impl IdempotentOptions {
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

    pub fn include_header(mut self, name: impl Into<String>) -> Self {
        self.include_headers.push(name.into());
        self
    }

    pub fn include_all_headers(mut self, include: bool) -> Self {
        self.include_all_headers = include;
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn on_duplicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestConfig, &RequestConfig) + Send + Sync + 'static,
    {
        self.on_duplicate = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for IdempotentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotentOptions")
            .field("ttl", &self.ttl)
            .field("key", &self.key)
            .field("include_headers", &self.include_headers)
            .field("include_all_headers", &self.include_all_headers)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("on_duplicate", &self.on_duplicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = IdempotentOptions::default();
        assert_eq!(options.ttl, Duration::from_secs(30));
        assert_eq!(options.hash_algorithm, HashAlgorithm::Fnv1a);
        assert!(!options.include_all_headers);
        assert!(options.include_headers.is_empty());
    }
}
