//! Bounded-parallelism batch execution for the reqpipe runtime.
//!
//! A batch of configs runs through the executor with at most
//! `max_concurrency` tasks in flight; a completing slot immediately admits
//! the next queued config. Results come back index-aligned with the input no
//! matter the completion order. `fail_fast` rejects the whole batch on the
//! first failure without awaiting the stragglers, and a batch `timeout`
//! bounds the wall clock for the whole operation (running tasks are not
//! forcibly aborted; their results are discarded).
//!
//! # Example
//!
//! ```no_run
//! use reqpipe_concurrent::{ConcurrencyFeature, ConcurrentOptions};
//!
//! # async fn example(executor: std::sync::Arc<reqpipe_core::RequestExecutor>) {
//! let pool = ConcurrencyFeature::new(executor);
//! let results = pool
//!     .get_concurrent(
//!         ["https://api.example.com/a", "https://api.example.com/b"],
//!         &ConcurrentOptions::new().max_concurrency(2),
//!     )
//!     .await;
//! # let _ = results;
//! # }
//! ```

mod config;
mod result;

pub use config::ConcurrentOptions;
pub use result::{failed_results, has_failures, successful_results, ConcurrencyResult};

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use reqpipe_core::{Body, Method, RequestConfig, RequestError, RequestExecutor, ValidationError};
use reqpipe_retry::RetryFeature;
use tokio::sync::Semaphore;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConcurrentStats {
    pub total_batches: u64,
    pub total_tasks: u64,
    pub total_failures: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

#[derive(Default)]
struct PoolState {
    total_batches: AtomicU64,
    total_tasks: AtomicU64,
    total_failures: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// One POST in a [`ConcurrencyFeature::post_concurrent`] batch.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub url: String,
    pub data: Option<Body>,
    /// Base config for headers, timeout etc.; url, method and data are
    /// overridden.
    pub base: Option<RequestConfig>,
}

impl PostRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data: None,
            base: None,
        }
    }

    pub fn with_data(mut self, data: Body) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_base(mut self, base: RequestConfig) -> Self {
        self.base = Some(base);
        self
    }
}

/// Runs batches of requests with bounded parallelism.
#[derive(Clone)]
pub struct ConcurrencyFeature {
    executor: Arc<RequestExecutor>,
    retry: RetryFeature,
    state: Arc<PoolState>,
}

impl ConcurrencyFeature {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        let retry = RetryFeature::new(Arc::clone(&executor));
        Self {
            executor,
            retry,
            state: Arc::new(PoolState::default()),
        }
    }

    /// Runs the batch. The returned vector has one entry per input config, at
    /// the same index. With `fail_fast`, the first failure rejects the whole
    /// operation with that task's error instead.
    pub async fn request_concurrent(
        &self,
        configs: Vec<RequestConfig>,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        if options.max_concurrency == Some(0) {
            return Err(ValidationError::ZeroConcurrency.into());
        }
        if configs.is_empty() {
            return Ok(Vec::new());
        }

        let count = configs.len();
        self.state.total_batches.fetch_add(1, Ordering::Relaxed);
        self.state
            .total_tasks
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::debug!(
            tasks = count,
            bound = ?options.max_concurrency,
            fail_fast = options.fail_fast,
            "running concurrent batch"
        );
        #[cfg(feature = "metrics")]
        counter!("reqpipe_concurrent_tasks_total").increment(count as u64);

        let semaphore = options
            .max_concurrency
            .map(|bound| Arc::new(Semaphore::new(bound)));

        let mut pending = FuturesUnordered::new();
        for (index, config) in configs.into_iter().enumerate() {
            let panic_config = config.clone();
            let handle = tokio::spawn(self.run_task(
                index,
                config,
                semaphore.clone(),
                options.retry_on_error.clone(),
            ));
            pending.push(async move {
                match handle.await {
                    Ok(result) => result,
                    Err(join_error) => ConcurrencyResult {
                        index,
                        config: panic_config,
                        outcome: Err(RequestError::concurrent(format!(
                            "batch task failed to complete: {join_error}"
                        ))),
                        duration: Duration::ZERO,
                        retry_count: 0,
                    },
                }
            });
        }

        let fail_fast = options.fail_fast;
        let gather = async move {
            let mut slots: Vec<Option<ConcurrencyResult>> = Vec::new();
            slots.resize_with(count, || None);

            while let Some(result) = pending.next().await {
                if fail_fast {
                    if let Err(error) = &result.outcome {
                        return Err(error.clone());
                    }
                }
                let index = result.index;
                slots[index] = Some(result);
            }
            // Every spawned task settled into its slot.
            Ok(slots.into_iter().flatten().collect())
        };

        match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, gather).await {
                Ok(result) => result,
                Err(_) => Err(RequestError::timeout(format!(
                    "concurrent batch timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => gather.await,
        }
    }

    fn run_task(
        &self,
        index: usize,
        config: RequestConfig,
        semaphore: Option<Arc<Semaphore>>,
        retry_policy: Option<reqpipe_retry::RetryPolicy>,
    ) -> impl std::future::Future<Output = ConcurrencyResult> + Send + 'static {
        let executor = Arc::clone(&self.executor);
        let retry = self.retry.clone();
        let state = Arc::clone(&self.state);

        async move {
            let submitted = config.clone();

            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        return ConcurrencyResult {
                            index,
                            config: submitted,
                            outcome: Err(RequestError::concurrent("concurrency pool closed")),
                            duration: Duration::ZERO,
                            retry_count: 0,
                        }
                    }
                },
                None => None,
            };

            let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.peak_in_flight.fetch_max(current, Ordering::SeqCst);

            let attempts = Arc::new(AtomicU32::new(0));
            let started = Instant::now();
            let outcome = match retry_policy {
                Some(base) => {
                    let counter = Arc::clone(&attempts);
                    let policy = base.on_retry(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                    retry.request_with_retry(config, &policy).await
                }
                None => executor.execute(config).await,
            };
            let duration = started.elapsed();

            state.in_flight.fetch_sub(1, Ordering::SeqCst);
            if outcome.is_err() {
                state.total_failures.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "metrics")]
                counter!("reqpipe_concurrent_failures_total").increment(1);
            }

            ConcurrencyResult {
                index,
                config: submitted,
                outcome,
                duration,
                retry_count: attempts.load(Ordering::SeqCst),
            }
        }
    }

    /// Duplicates `config` `count` times, tagging each clone with its
    /// `request_index` metadata entry. Zero or negative counts produce an
    /// empty result.
    pub async fn request_multiple(
        &self,
        config: RequestConfig,
        count: isize,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        if count <= 0 {
            return Ok(Vec::new());
        }
        let configs = (0..count)
            .map(|i| {
                config
                    .clone()
                    .with_metadata_entry("request_index", i as i64)
            })
            .collect();
        self.request_concurrent(configs, options).await
    }

    /// GETs every url in one batch.
    pub async fn get_concurrent<I, S>(
        &self,
        urls: I,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let configs = urls
            .into_iter()
            .map(|url| RequestConfig::get(url))
            .collect();
        self.request_concurrent(configs, options).await
    }

    /// POSTs every entry in one batch.
    pub async fn post_concurrent(
        &self,
        requests: Vec<PostRequest>,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        let configs = requests
            .into_iter()
            .map(|request| {
                let mut config = request
                    .base
                    .unwrap_or_else(|| RequestConfig::post(request.url.clone()));
                config.url = request.url;
                config.method = Method::Post;
                if request.data.is_some() {
                    config.data = request.data;
                }
                config
            })
            .collect();
        self.request_concurrent(configs, options).await
    }

    pub fn stats(&self) -> ConcurrentStats {
        ConcurrentStats {
            total_batches: self.state.total_batches.load(Ordering::Relaxed),
            total_tasks: self.state.total_tasks.load(Ordering::Relaxed),
            total_failures: self.state.total_failures.load(Ordering::Relaxed),
            in_flight: self.state.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.state.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use reqpipe_core::{ConfigManager, ErrorKind, Response, Transport};

    /// Transport with a per-call delay; the configured failing url fails
    /// after `fail_delay` instead. Tracks its own peak concurrency.
    struct DelayTransport {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail_url: Option<&'static str>,
        fail_delay: Duration,
    }

    impl DelayTransport {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
                delay,
                fail_url: None,
                fail_delay: Duration::ZERO,
            })
        }

        fn failing_on(url: &'static str, delay: Duration, fail_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
                delay,
                fail_url: Some(url),
                fail_delay,
            })
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for DelayTransport {
        fn send(
            &self,
            config: RequestConfig,
        ) -> BoxFuture<'static, Result<Response, RequestError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let in_flight = Arc::clone(&self.in_flight);
            let peak = Arc::clone(&self.peak);
            let fails = self.fail_url == Some(config.url.as_str());
            let delay = if fails { self.fail_delay } else { self.delay };

            Box::pin(async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if fails {
                    Err(RequestError::http(500, "scripted failure"))
                } else {
                    Ok(Response::json(serde_json::json!({ "url": config.url })))
                }
            })
        }
    }

    fn feature_over(transport: Arc<dyn Transport>) -> ConcurrencyFeature {
        ConcurrencyFeature::new(Arc::new(RequestExecutor::new(
            transport,
            Arc::new(ConfigManager::new()),
        )))
    }

    fn gets(count: usize) -> Vec<RequestConfig> {
        (0..count)
            .map(|i| RequestConfig::get(format!("/item/{i}")))
            .collect()
    }

    #[tokio::test]
    async fn results_are_index_aligned() {
        let transport = DelayTransport::new(Duration::from_millis(10));
        let pool = feature_over(transport);

        let configs = gets(5);
        let results = pool
            .request_concurrent(configs.clone(), &ConcurrentOptions::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.config.url, configs[i].url);
            assert!(result.is_success());
        }
    }

    #[tokio::test]
    async fn zero_concurrency_is_a_validation_error() {
        let transport = DelayTransport::new(Duration::ZERO);
        let pool = feature_over(transport.clone());

        let err = pool
            .request_concurrent(gets(2), &ConcurrentOptions::new().max_concurrency(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let transport = DelayTransport::new(Duration::ZERO);
        let pool = feature_over(transport);
        let results = pool
            .request_concurrent(Vec::new(), &ConcurrentOptions::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn bound_caps_in_flight_tasks() {
        let transport = DelayTransport::new(Duration::from_millis(50));
        let pool = feature_over(transport.clone());

        let started = Instant::now();
        let results = pool
            .request_concurrent(gets(6), &ConcurrentOptions::new().max_concurrency(2))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(ConcurrencyResult::is_success));
        assert!(transport.peak() <= 2, "peak {}", transport.peak());
        // Three waves of two at ~50ms each.
        assert!(elapsed >= Duration::from_millis(120), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn unbounded_runs_everything_at_once() {
        let transport = DelayTransport::new(Duration::from_millis(40));
        let pool = feature_over(transport.clone());

        let started = Instant::now();
        pool.request_concurrent(gets(5), &ConcurrentOptions::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(transport.peak(), 5);
        assert!(elapsed < Duration::from_millis(200), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn fail_fast_rejects_with_the_first_error() {
        let transport = DelayTransport::failing_on(
            "/item/1",
            Duration::from_millis(200),
            Duration::from_millis(30),
        );
        let pool = feature_over(transport);

        let started = Instant::now();
        let err = pool
            .request_concurrent(gets(5), &ConcurrentOptions::new().fail_fast(true))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.kind, ErrorKind::Http);
        assert_eq!(err.status, Some(500));
        assert!(elapsed < Duration::from_millis(150), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn without_fail_fast_every_task_settles() {
        let transport = DelayTransport::failing_on(
            "/item/1",
            Duration::from_millis(20),
            Duration::from_millis(5),
        );
        let pool = feature_over(transport);

        let results = pool
            .request_concurrent(gets(4), &ConcurrentOptions::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
        assert!(has_failures(&results));
        assert_eq!(failed_results(&results).len(), 1);
        assert_eq!(failed_results(&results)[0].index, 1);
        assert_eq!(successful_results(&results).len(), 3);
    }

    #[tokio::test]
    async fn batch_timeout_rejects_with_the_limit_in_the_message() {
        let transport = DelayTransport::new(Duration::from_millis(500));
        let pool = feature_over(transport);

        let err = pool
            .request_concurrent(
                gets(2),
                &ConcurrentOptions::new().timeout(Duration::from_millis(40)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("40ms"));
    }

    #[tokio::test]
    async fn request_multiple_duplicates_and_tags() {
        let transport = DelayTransport::new(Duration::ZERO);
        let pool = feature_over(transport);

        let results = pool
            .request_multiple(RequestConfig::get("/one"), 3, &ConcurrentOptions::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(
                result.config.metadata.get("request_index"),
                Some(&serde_json::json!(i))
            );
        }

        assert!(pool
            .request_multiple(RequestConfig::get("/one"), 0, &ConcurrentOptions::new())
            .await
            .unwrap()
            .is_empty());
        assert!(pool
            .request_multiple(RequestConfig::get("/one"), -2, &ConcurrentOptions::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn retry_on_error_reports_retry_counts() {
        // Fails every call to /item/0; retried twice then surfaced.
        let transport = DelayTransport::failing_on(
            "/item/0",
            Duration::from_millis(5),
            Duration::from_millis(5),
        );
        let pool = feature_over(transport.clone());

        let policy = reqpipe_retry::RetryPolicy::builder()
            .retries(2)
            .delay(Duration::from_millis(1))
            .build();
        let results = pool
            .request_concurrent(gets(2), &ConcurrentOptions::new().retry_on_error(policy))
            .await
            .unwrap();

        assert!(!results[0].is_success());
        assert_eq!(results[0].retry_count, 2);
        assert!(results[1].is_success());
        assert_eq!(results[1].retry_count, 0);
        // 3 attempts for the failing url, 1 for the healthy one.
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn post_concurrent_builds_post_configs() {
        let transport = DelayTransport::new(Duration::ZERO);
        let pool = feature_over(transport);

        let results = pool
            .post_concurrent(
                vec![
                    PostRequest::new("/a").with_data(Body::Json(serde_json::json!({"n": 1}))),
                    PostRequest::new("/b"),
                ],
                &ConcurrentOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].config.method, Method::Post);
        assert!(results[0].config.data.is_some());
        assert_eq!(results[1].config.url, "/b");
    }

    #[tokio::test]
    async fn stats_track_batches_and_peaks() {
        let transport = DelayTransport::new(Duration::from_millis(20));
        let pool = feature_over(transport);

        pool.request_concurrent(gets(4), &ConcurrentOptions::new().max_concurrency(2))
            .await
            .unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total_batches, 1);
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.in_flight, 0);
        assert!(stats.peak_in_flight <= 2);
        assert!(stats.peak_in_flight >= 1);
    }
}
