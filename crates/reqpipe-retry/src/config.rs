//! Retry policy and its builder.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqpipe_core::{EventListeners, FnListener, RequestError, ValidationError};

use crate::events::RetryEvent;

/// Predicate deciding whether a failed attempt should be retried.
///
/// Receives the error and the 0-indexed attempt that just failed.
pub type RetryPredicate = Arc<dyn Fn(&RequestError, u32) -> bool + Send + Sync>;

const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Policy for [`RetryFeature::request_with_retry`](crate::RetryFeature::request_with_retry).
///
/// `retries` is the number of *re*-sends: a request with `retries = 3` is
/// attempted at most four times.
#[derive(Clone)]
pub struct RetryPolicy {
    pub(crate) retries: u32,
    pub(crate) delay: Duration,
    pub(crate) backoff_factor: Option<f64>,
    pub(crate) jitter: Option<f64>,
    pub(crate) should_retry: Option<RetryPredicate>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryPolicy {
    /// A policy with `retries` re-sends and the defaults: 1s constant delay,
    /// no jitter, default predicate.
    pub fn new(retries: u32) -> Self {
        Self::builder().retries(retries).build()
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Attaches a retry listener to an existing policy; used by layers that
    /// compose retry and need to observe attempts per call.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Rejects out-of-range backoff and jitter values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(factor) = self.backoff_factor {
            if !(factor > 0.0) {
                return Err(ValidationError::BackoffOutOfRange(factor));
            }
        }
        if let Some(jitter) = self.jitter {
            if !(0.0..=1.0).contains(&jitter) {
                return Err(ValidationError::JitterOutOfRange(jitter));
            }
        }
        Ok(())
    }

    /// Whether this error, failed at 0-indexed `attempt`, should be retried.
    pub(crate) fn wants_retry(&self, error: &RequestError, attempt: u32) -> bool {
        match &self.should_retry {
            Some(predicate) => predicate(error, attempt),
            None => default_should_retry(error),
        }
    }

    /// The wait before re-sending after 0-indexed `attempt` failed:
    /// `floor(base + base * rand * jitter)` with
    /// `base = delay * backoff_factor^attempt`.
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.unwrap_or(1.0);
        let base = self.delay.as_millis() as f64 * factor.powi(attempt as i32);
        let jitter = self.jitter.unwrap_or(0.0);
        let jittered = if jitter > 0.0 {
            base + base * rand::rng().random::<f64>() * jitter
        } else {
            base
        };
        Duration::from_millis(jittered.floor() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("delay", &self.delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("should_retry", &self.should_retry.is_some())
            .finish()
    }
}

/// Retries NETWORK errors and HTTP 5xx; everything else stops.
pub fn default_should_retry(error: &RequestError) -> bool {
    if error.is_network() {
        return true;
    }
    error.is_http() && matches!(error.status, Some(s) if (500..600).contains(&s))
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    retries: u32,
    delay: Duration,
    backoff_factor: Option<f64>,
    jitter: Option<f64>,
    should_retry: Option<RetryPredicate>,
    event_listeners: EventListeners<RetryEvent>,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            retries: 0,
            delay: DEFAULT_DELAY,
            backoff_factor: None,
            jitter: None,
            should_retry: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Number of re-sends after the initial attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Base delay before the first retry. Defaults to one second.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Multiplier applied per attempt; 1.0 keeps the delay constant.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    /// Random delay inflation in `0.0..=1.0` of the base delay.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Custom predicate; replaces the default NETWORK/5xx rule. A panicking
    /// predicate is treated as "stop retrying".
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RequestError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Callback before each retry, with the 1-indexed retry number and the
    /// delay about to be waited.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Callback when the request succeeds, with the total attempt count.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Callback when every attempt failed, with the total attempt count.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Callback when an error is not retried because the predicate declined.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, RetryEvent::IgnoredError { .. }) {
                f();
            }
        }));
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            delay: self.delay,
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
            should_retry: self.should_retry,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
