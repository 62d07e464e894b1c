//! Events emitted by the retry feature.

use reqpipe_core::RuntimeEvent;
use std::time::{Duration, Instant};

/// One observable moment in a retried request's life.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A failed attempt will be retried after `delay`.
    Retry {
        /// 1-indexed retry number (1 = first retry).
        attempt: u32,
        delay: Duration,
        timestamp: Instant,
    },
    /// The request succeeded after `attempts` total attempts.
    Success { attempts: u32, timestamp: Instant },
    /// Every attempt failed; the final error is surfaced unchanged.
    Exhausted { attempts: u32, timestamp: Instant },
    /// An error occurred but the predicate declined to retry it.
    IgnoredError { attempt: u32, timestamp: Instant },
}

impl RuntimeEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "retry_success",
            RetryEvent::Exhausted { .. } => "retry_exhausted",
            RetryEvent::IgnoredError { .. } => "retry_ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }
}
