//! Batch execution options.

use std::fmt;
use std::time::Duration;

use reqpipe_retry::RetryPolicy;

/// Options for one concurrent batch.
#[derive(Clone, Default)]
pub struct ConcurrentOptions {
    /// In-flight bound for this batch; `None` runs everything at once.
    /// Zero is rejected with a VALIDATION error.
    pub max_concurrency: Option<usize>,
    /// Reject the whole batch on the first failure instead of collecting
    /// per-task outcomes.
    pub fail_fast: bool,
    /// Wall-clock limit for the whole batch. On expiry the batch rejects;
    /// tasks already running are left to finish and their results discarded.
    pub timeout: Option<Duration>,
    /// Per-task retry policy; attempts are reported as `retry_count`.
    pub retry_on_error: Option<RetryPolicy>,
}

impl ConcurrentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrency(mut self, bound: usize) -> Self {
        self.max_concurrency = Some(bound);
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_on_error(mut self, policy: RetryPolicy) -> Self {
        self.retry_on_error = Some(policy);
        self
    }
}

impl fmt::Debug for ConcurrentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentOptions")
            .field("max_concurrency", &self.max_concurrency)
            .field("fail_fast", &self.fail_fast)
            .field("timeout", &self.timeout)
            .field("retry_on_error", &self.retry_on_error.is_some())
            .finish()
    }
}
