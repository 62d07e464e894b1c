//! One-shot request execution.
//!
//! The executor is the innermost layer every feature wraps: it resolves the
//! effective config, assigns a request id, runs the interceptor chain around
//! the transport, enforces the per-request timeout and cancel signal, and
//! wraps failures into the error model exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::Rng;

use crate::config::{Body, RequestConfig};
use crate::error::RequestError;
use crate::interceptor::{ErrorOutcome, InterceptorChain};
use crate::manager::ConfigManager;
use crate::transport::{Response, Transport};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Executes single requests through the interceptor chain and the transport.
pub struct RequestExecutor {
    transport: RwLock<Arc<dyn Transport>>,
    manager: Arc<ConfigManager>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, manager: Arc<ConfigManager>) -> Self {
        Self {
            transport: RwLock::new(transport),
            manager,
        }
    }

    pub fn manager(&self) -> &Arc<ConfigManager> {
        &self.manager
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.read().clone()
    }

    /// Swaps the transport, returning the previous one. Interceptors, global
    /// config and any feature state are untouched.
    pub fn swap_transport(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        std::mem::replace(&mut *self.transport.write(), transport)
    }

    /// Executes one request: validate + merge, hooks, interceptor phases,
    /// transport, error enrichment.
    pub async fn execute(&self, config: RequestConfig) -> Result<Response, RequestError> {
        let effective = self.manager.effective(config)?;
        let request_id = generate_request_id();
        let started = Instant::now();

        run_start_hook(&effective);
        if effective.debug {
            tracing::debug!(
                request_id = %request_id,
                method = %effective.method,
                url = %effective.url,
                headers = ?effective.headers.redacted(),
                body = %body_preview(effective.data.as_ref()),
                "🚀 request start"
            );
        }

        let chain = self.manager.chain();
        let outcome = self.run_pipeline(&chain, &effective).await;
        let duration = started.elapsed();

        match outcome {
            Ok(response) => {
                if effective.debug {
                    tracing::debug!(
                        request_id = %request_id,
                        duration_ms = duration.as_millis() as u64,
                        status = response.status,
                        "✅ request succeeded"
                    );
                }
                run_end_hook(&effective, duration);
                Ok(response)
            }
            Err(mut error) => {
                error.enrich_context(&effective, &request_id, duration);
                if effective.debug {
                    tracing::debug!(
                        request_id = %request_id,
                        duration_ms = duration.as_millis() as u64,
                        kind = %error.kind,
                        error = %error,
                        "❌ request failed"
                    );
                }
                run_error_hook(&effective, &error, duration);
                Err(error)
            }
        }
    }

    /// The three interceptor phases around the transport call. A pre-send
    /// failure skips the transport entirely.
    async fn run_pipeline(
        &self,
        chain: &InterceptorChain,
        config: &RequestConfig,
    ) -> Result<Response, RequestError> {
        let prepared = match chain.run_request(config.clone()).await {
            Ok(prepared) => prepared,
            Err(error) => return finish_error(chain, error, config).await,
        };

        match self.send_with_limits(&prepared).await {
            Ok(response) => match chain.run_response(response, &prepared).await {
                Ok(response) => Ok(response),
                Err(error) => finish_error(chain, error, &prepared).await,
            },
            Err(error) => finish_error(chain, error, &prepared).await,
        }
    }

    /// The raw transport call, raced against the cancel signal and bounded by
    /// the per-request timeout.
    async fn send_with_limits(&self, config: &RequestConfig) -> Result<Response, RequestError> {
        let transport = self.transport();
        let send = transport.send(config.clone());
        let signal = config.signal.clone();

        let race = async move {
            match signal {
                Some(signal) => tokio::select! {
                    result = send => result,
                    _ = signal.cancelled() => Err(RequestError::timeout("request aborted by signal")),
                },
                None => send.await,
            }
        };

        match config.effective_timeout() {
            Some(limit) => match tokio::time::timeout(limit, race).await {
                Ok(result) => result,
                Err(_) => Err(RequestError::timeout(format!(
                    "request timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => race.await,
        }
    }
}

async fn finish_error(
    chain: &InterceptorChain,
    error: RequestError,
    config: &RequestConfig,
) -> Result<Response, RequestError> {
    match chain.run_error(error, config).await {
        ErrorOutcome::Recovered(response) => Ok(response),
        ErrorOutcome::Raise(error) => Err(error),
    }
}

fn generate_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let suffix: u32 = rand::rng().random_range(0..1_000_000);
    format!("{millis}-{suffix:06}")
}

fn run_start_hook(config: &RequestConfig) {
    if let Some(hook) = config.hooks.on_start.clone() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(config)));
        if result.is_err() {
            tracing::warn!(url = %config.url, "on_start hook panicked");
        }
    }
}

fn run_end_hook(config: &RequestConfig, duration: Duration) {
    if let Some(hook) = config.hooks.on_end.clone() {
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(config, duration)));
        if result.is_err() {
            tracing::warn!(url = %config.url, "on_end hook panicked");
        }
    }
}

fn run_error_hook(config: &RequestConfig, error: &RequestError, duration: Duration) {
    if let Some(hook) = config.hooks.on_error.clone() {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            hook(config, error, duration)
        }));
        if result.is_err() {
            tracing::warn!(url = %config.url, "on_error hook panicked");
        }
    }
}

fn body_preview(body: Option<&Body>) -> String {
    let Some(body) = body else {
        return "<none>".to_string();
    };
    match body {
        Body::Json(v) => truncate(v.to_string()),
        Body::Text(t) => truncate(t.clone()),
        Body::Bytes(b) => format!("<{} bytes>", b.len()),
        Body::Form(pairs) => format!("<form: {} fields>", pairs.len()),
        Body::Multipart(parts) => format!("<multipart: {} parts>", parts.len()),
    }
}

fn truncate(mut text: String) -> String {
    if text.chars().count() > BODY_PREVIEW_LIMIT {
        text = text.chars().take(BODY_PREVIEW_LIMIT).collect();
        text.push('…');
    }
    text
}
