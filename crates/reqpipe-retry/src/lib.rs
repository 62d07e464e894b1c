//! Policy-driven retry for the reqpipe runtime.
//!
//! Wraps the [`RequestExecutor`] with retry-on-failure semantics: a policy
//! decides which errors are retryable and how long to back off between
//! attempts. The final attempt's error is surfaced unchanged; the retry layer
//! never re-wraps it.
//!
//! # Example
//!
//! ```no_run
//! use reqpipe_retry::{RetryFeature, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example(executor: std::sync::Arc<reqpipe_core::RequestExecutor>) {
//! let retry = RetryFeature::new(executor);
//! let policy = RetryPolicy::builder()
//!     .retries(3)
//!     .delay(Duration::from_millis(100))
//!     .backoff_factor(2.0)
//!     .jitter(0.2)
//!     .on_retry(|attempt, delay| println!("retry {attempt} after {delay:?}"))
//!     .build();
//!
//! let config = reqpipe_core::RequestConfig::get("https://api.example.com/unstable");
//! let _ = retry.request_with_retry(config, &policy).await;
//! # }
//! ```

mod config;
mod events;

pub use config::{default_should_retry, RetryPolicy, RetryPolicyBuilder, RetryPredicate};
pub use events::RetryEvent;

use std::sync::Arc;
use std::time::Instant;

use reqpipe_core::{RequestConfig, RequestError, RequestExecutor, Response};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Retries failed requests according to a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryFeature {
    executor: Arc<RequestExecutor>,
}

impl RetryFeature {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Sends the request, re-sending per the policy on retryable failures.
    ///
    /// With `retries = r` the transport is attempted between 1 and `r + 1`
    /// times. A predicate panic stops retrying and surfaces the original
    /// error.
    pub async fn request_with_retry(
        &self,
        config: RequestConfig,
        policy: &RetryPolicy,
    ) -> Result<Response, RequestError> {
        policy.validate()?;

        let max_attempts = policy.retries() + 1;
        let mut attempt: u32 = 0;

        loop {
            match self.executor.execute(config.clone()).await {
                Ok(response) => {
                    policy.event_listeners.emit(&RetryEvent::Success {
                        attempts: attempt + 1,
                        timestamp: Instant::now(),
                    });
                    #[cfg(feature = "metrics")]
                    counter!("reqpipe_retry_success_total").increment(1);
                    return Ok(response);
                }
                Err(error) => {
                    if attempt + 1 >= max_attempts {
                        policy.event_listeners.emit(&RetryEvent::Exhausted {
                            attempts: attempt + 1,
                            timestamp: Instant::now(),
                        });
                        #[cfg(feature = "metrics")]
                        counter!("reqpipe_retry_exhausted_total").increment(1);
                        return Err(error);
                    }

                    let wants_retry = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                        || policy.wants_retry(&error, attempt),
                    ))
                    .unwrap_or_else(|_| {
                        tracing::warn!("should_retry predicate panicked; not retrying");
                        false
                    });

                    if !wants_retry {
                        policy.event_listeners.emit(&RetryEvent::IgnoredError {
                            attempt,
                            timestamp: Instant::now(),
                        });
                        return Err(error);
                    }

                    let delay = policy.delay_for(attempt);
                    policy.event_listeners.emit(&RetryEvent::Retry {
                        attempt: attempt + 1,
                        delay,
                        timestamp: Instant::now(),
                    });
                    #[cfg(feature = "metrics")]
                    counter!("reqpipe_retry_attempts_total").increment(1);
                    tracing::debug!(
                        url = %config.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request"
                    );

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
