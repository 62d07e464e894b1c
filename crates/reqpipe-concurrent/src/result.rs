//! Per-task batch results, index-aligned with the submitted configs.

use std::time::Duration;

use reqpipe_core::{RequestConfig, RequestError, Response};

/// Outcome of one member of a concurrent batch.
#[derive(Debug)]
pub struct ConcurrencyResult {
    /// Position in the submitted batch; `results[i].index == i` always holds.
    pub index: usize,
    /// The config as submitted.
    pub config: RequestConfig,
    pub outcome: Result<Response, RequestError>,
    /// Time from admission to settlement.
    pub duration: Duration,
    /// Retries performed; zero unless the batch composed a retry policy.
    pub retry_count: u32,
}

impl ConcurrencyResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&Response> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.outcome.as_ref().err()
    }
}

/// The successful members, in index order.
pub fn successful_results(results: &[ConcurrencyResult]) -> Vec<&ConcurrencyResult> {
    results.iter().filter(|r| r.is_success()).collect()
}

/// The failed members, in index order.
pub fn failed_results(results: &[ConcurrencyResult]) -> Vec<&ConcurrencyResult> {
    results.iter().filter(|r| !r.is_success()).collect()
}

/// Whether any member failed.
pub fn has_failures(results: &[ConcurrencyResult]) -> bool {
    results.iter().any(|r| !r.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqpipe_core::Method;

    fn result(index: usize, ok: bool) -> ConcurrencyResult {
        ConcurrencyResult {
            index,
            config: RequestConfig::new(Method::Get, "/x"),
            outcome: if ok {
                Ok(Response::json(serde_json::json!(index)))
            } else {
                Err(RequestError::network("down"))
            },
            duration: Duration::from_millis(1),
            retry_count: 0,
        }
    }

    #[test]
    fn helpers_partition_results() {
        let results = vec![result(0, true), result(1, false), result(2, true)];
        assert_eq!(successful_results(&results).len(), 2);
        assert_eq!(failed_results(&results).len(), 1);
        assert_eq!(failed_results(&results)[0].index, 1);
        assert!(has_failures(&results));
        assert!(!has_failures(&results[..1]));
    }
}
