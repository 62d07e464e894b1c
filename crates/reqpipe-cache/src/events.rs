//! Events emitted by the cache feature.

use reqpipe_core::RuntimeEvent;
use std::time::Instant;

/// One observable cache moment.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A live entry answered the request.
    Hit { key: String, timestamp: Instant },
    /// No live entry; the request went to the transport.
    Miss { key: String, timestamp: Instant },
    /// An entry was sacrificed to the entry bound.
    Eviction { key: String, timestamp: Instant },
    /// The background sweeper removed expired entries.
    Swept { removed: usize, timestamp: Instant },
}

impl RuntimeEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "cache_hit",
            CacheEvent::Miss { .. } => "cache_miss",
            CacheEvent::Eviction { .. } => "cache_eviction",
            CacheEvent::Swept { .. } => "cache_swept",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Eviction { timestamp, .. }
            | CacheEvent::Swept { timestamp, .. } => *timestamp,
        }
    }
}
