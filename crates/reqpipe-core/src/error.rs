//! The unified error model for the request pipeline.
//!
//! Every failure in the runtime surfaces as a [`RequestError`]: a classified
//! error carrying the request context it occurred in. Feature layers never
//! re-wrap an existing `RequestError` — they enrich its context in place, so
//! the kind observed by the caller is the kind that entered the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::config::{Method, RequestConfig};

/// Classification of a request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection-level failure: DNS, refused connection, CORS, broken pipe.
    Network,
    /// The server answered with an error status (>= 400).
    Http,
    /// The request timed out or was aborted through its cancel signal.
    Timeout,
    /// The request configuration was rejected before anything was sent.
    Validation,
    /// A cache storage operation failed.
    Cache,
    /// A concurrency limit or queue rejected the request.
    Concurrent,
    /// A retry-layer failure that is not attributable to a single attempt.
    Retry,
    /// Anything that could not be classified.
    Unknown,
}

impl ErrorKind {
    /// Stable string form used in logs and error displays.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Http => "HTTP",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Cache => "CACHE",
            ErrorKind::Concurrent => "CONCURRENT",
            ErrorKind::Retry => "RETRY",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contextual attributes attached to every [`RequestError`].
///
/// `timestamp` is set when the error value is constructed; the other fields
/// are filled in by the executor as the error travels out of the pipeline.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub url: Option<String>,
    pub method: Option<Method>,
    pub duration: Option<Duration>,
    pub timestamp: SystemTime,
    pub user_agent: Option<String>,
    pub tag: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub request_id: Option<String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            url: None,
            method: None,
            duration: None,
            timestamp: SystemTime::now(),
            user_agent: None,
            tag: None,
            metadata: BTreeMap::new(),
            request_id: None,
        }
    }
}

/// A classified request failure with contextual attributes.
///
/// The original underlying error, when there is one, is preserved untouched
/// in `source` and reachable through [`std::error::Error::source`].
#[derive(Clone)]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub is_http_error: bool,
    pub code: Option<String>,
    pub context: ErrorContext,
    suggestion: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl RequestError {
    /// Creates an error with an explicit classification.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            is_http_error: kind == ErrorKind::Http,
            code: None,
            context: ErrorContext::default(),
            suggestion: None,
            source: None,
        }
    }

    /// Creates an error whose kind is inferred from the message, status and
    /// HTTP flag, per [`infer_kind`].
    pub fn classified(
        message: impl Into<String>,
        status: Option<u16>,
        is_http_error: bool,
    ) -> Self {
        let message = message.into();
        let kind = infer_kind(&message, status, is_http_error);
        Self {
            kind,
            message,
            status,
            is_http_error: kind == ErrorKind::Http,
            code: None,
            context: ErrorContext::default(),
            suggestion: None,
            source: None,
        }
    }

    /// Shorthand for a NETWORK-classified error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Shorthand for an HTTP-classified error with a status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Http, message);
        err.status = Some(status);
        err
    }

    /// Shorthand for a TIMEOUT-classified error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Shorthand for a VALIDATION-classified error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for a CONCURRENT-classified error.
    pub fn concurrent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Concurrent, message)
    }

    /// Attaches a machine-readable code (e.g. `BUILDER_NO_URL`).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attaches the underlying error without altering it.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Overrides the derived suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attaches an HTTP status after construction.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn is_http(&self) -> bool {
        self.kind == ErrorKind::Http
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    /// A human-facing hint derived from the classification, unless overridden.
    pub fn suggestion(&self) -> &str {
        if let Some(s) = &self.suggestion {
            return s;
        }
        match self.kind {
            ErrorKind::Network => "check network connectivity and that the target host is reachable",
            ErrorKind::Http => match self.status {
                Some(401) => "the request was not authenticated; check credentials",
                Some(403) => "the request was refused; check permissions",
                Some(404) => "the resource does not exist; check the url",
                Some(429) => "the server is rate limiting; slow down and retry later",
                Some(s) if s >= 500 => "the server failed; retry later or check server logs",
                _ => "inspect the response status and payload",
            },
            ErrorKind::Timeout => "increase the request timeout or verify the upstream is responsive",
            ErrorKind::Validation => "fix the request configuration before sending",
            ErrorKind::Cache => "clear the response cache and retry",
            ErrorKind::Concurrent => "reduce concurrency or retry once the queue drains",
            ErrorKind::Retry => "all attempts failed; inspect the underlying error",
            ErrorKind::Unknown => "inspect the original error for details",
        }
    }

    /// Fills in missing context fields from the request the error occurred in.
    /// Existing values are never overwritten; the source error is untouched.
    pub fn enrich_context(&mut self, config: &RequestConfig, request_id: &str, duration: Duration) {
        let ctx = &mut self.context;
        if ctx.url.is_none() {
            ctx.url = Some(config.url.clone());
        }
        if ctx.method.is_none() {
            ctx.method = Some(config.method);
        }
        ctx.duration.get_or_insert(duration);
        if ctx.request_id.is_none() {
            ctx.request_id = Some(request_id.to_string());
        }
        if ctx.tag.is_none() {
            ctx.tag = config.tag.clone();
        }
        if ctx.metadata.is_empty() && !config.metadata.is_empty() {
            ctx.metadata = config.metadata.clone();
        }
        if ctx.user_agent.is_none() {
            ctx.user_agent = config.headers.get("user-agent").map(str::to_owned);
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("status", &self.status)
            .field("code", &self.code)
            .field("context", &self.context)
            .field("source", &self.source)
            .finish()
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn std::error::Error + 'static))
    }
}

/// Infers the classification for an error observed at the transport boundary.
///
/// Precedence: an in-range error status always wins; a success status (100..400)
/// never classifies as HTTP, even when the flag is set. The explicit flag only
/// decides when no status is present or the status is outside 100..=599.
/// Network tokens are checked before timeout tokens, so "connection timeout"
/// classifies as NETWORK.
pub fn infer_kind(message: &str, status: Option<u16>, is_http_error: bool) -> ErrorKind {
    match status {
        Some(s) if s >= 400 && s < 600 => return ErrorKind::Http,
        Some(s) if (100..400).contains(&s) => {}
        Some(_) if is_http_error => return ErrorKind::Http,
        Some(_) => {}
        None if is_http_error => return ErrorKind::Http,
        None => {}
    }

    let m = message.to_ascii_lowercase();
    if ["network", "fetch", "connection", "cors"]
        .iter()
        .any(|t| m.contains(t))
    {
        return ErrorKind::Network;
    }
    if m.contains("timeout") || m.contains("timed out") || m.contains("abort") {
        return ErrorKind::Timeout;
    }
    ErrorKind::Unknown
}

/// Request configuration violations, reported before anything is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("request url must not be empty")]
    EmptyUrl,
    #[error("unknown http method: {0}")]
    UnknownMethod(String),
    #[error("jitter must be within 0.0..=1.0, got {0}")]
    JitterOutOfRange(f64),
    #[error("backoff factor must be greater than zero, got {0}")]
    BackoffOutOfRange(f64),
    #[error("max concurrency must be greater than zero")]
    ZeroConcurrency,
}

impl From<ValidationError> for RequestError {
    fn from(err: ValidationError) -> Self {
        RequestError::new(ErrorKind::Validation, err.to_string())
    }
}
