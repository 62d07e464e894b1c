//! Shared test transport for the workspace-level integration tests.
//!
//! A scriptable transport: per-url delays, scripted failures (always or the
//! first N calls), invocation counting, start-order recording, and peak
//! concurrency tracking.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use reqpipe::{RequestConfig, RequestError, Response, Transport};

/// Routes runtime debug logs into the test capture; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

enum FailMode {
    Always,
    Times(usize),
}

struct FailScript {
    mode: FailMode,
    error: fn() -> RequestError,
}

impl FailScript {
    fn take_one(&mut self) -> Option<RequestError> {
        match &mut self.mode {
            FailMode::Always => Some((self.error)()),
            FailMode::Times(remaining) => {
                if *remaining == 0 {
                    None
                } else {
                    *remaining -= 1;
                    Some((self.error)())
                }
            }
        }
    }
}

pub struct ScriptedTransport {
    default_delay: Mutex<Duration>,
    delays: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<String, FailScript>>,
    calls: AtomicUsize,
    starts: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            default_delay: Mutex::new(Duration::ZERO),
            delays: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            starts: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let transport = Self::new();
        *transport.default_delay.lock().unwrap() = delay;
        transport
    }

    pub fn set_delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Every call to `url` fails with an HTTP 500.
    pub fn fail_always(&self, url: &str) {
        self.failures.lock().unwrap().insert(
            url.to_string(),
            FailScript {
                mode: FailMode::Always,
                error: || RequestError::http(500, "scripted server error"),
            },
        );
    }

    /// The first `times` calls to `url` fail with an HTTP 500.
    pub fn fail_times(&self, url: &str, times: usize) {
        self.failures.lock().unwrap().insert(
            url.to_string(),
            FailScript {
                mode: FailMode::Times(times),
                error: || RequestError::http(500, "scripted server error"),
            },
        );
    }

    /// Every call to `url` fails with the given HTTP status.
    pub fn fail_status(&self, url: &str, status: u16) {
        let error: fn() -> RequestError = match status {
            404 => || RequestError::http(404, "scripted not found"),
            429 => || RequestError::http(429, "scripted rate limit"),
            _ => || RequestError::http(500, "scripted server error"),
        };
        self.failures.lock().unwrap().insert(
            url.to_string(),
            FailScript {
                mode: FailMode::Always,
                error,
            },
        );
    }

    /// Every call to `url` fails with a NETWORK-classified error.
    pub fn fail_network(&self, url: &str) {
        self.failures.lock().unwrap().insert(
            url.to_string(),
            FailScript {
                mode: FailMode::Always,
                error: || RequestError::network("scripted connection failure"),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Urls in the order their transport calls started.
    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, config: RequestConfig) -> BoxFuture<'static, Result<Response, RequestError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.starts.lock().unwrap().push(config.url.clone());

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&config.url)
            .copied()
            .unwrap_or(*self.default_delay.lock().unwrap());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&config.url)
            .and_then(FailScript::take_one);

        let in_flight = Arc::clone(&self.in_flight);
        let peak = Arc::clone(&self.peak);
        let url = config.url;

        Box::pin(async move {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(current, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);

            match failure {
                Some(error) => Err(error),
                None => Ok(Response::json(serde_json::json!({ "url": url }))),
            }
        })
    }
}
