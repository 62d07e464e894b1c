//! The transport seam and the response model.
//!
//! The core never opens sockets itself; it hands the effective config to an
//! injected [`Transport`] and interprets the outcome. The trait is
//! object-safe: implementations return a [`BoxFuture`] so the executor can
//! hold `Arc<dyn Transport>` and swap it at runtime.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::{Headers, RequestConfig};
use crate::error::RequestError;

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    Empty,
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// One response as produced by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body,
        }
    }

    /// A 200 response with a JSON body; the common shape in tests.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(200, ResponseBody::Json(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(200, ResponseBody::Text(text.into()))
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self::new(200, ResponseBody::Bytes(bytes))
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The single capability the core requires from the outside: send one
/// request, asynchronously, and either produce a [`Response`] or fail with a
/// pre-classified [`RequestError`].
///
/// Implementations are expected to honour `config.signal`, map statuses
/// >= 400 into failures, respect `config.response_kind`, append `params` to
/// the url, and never put a body on GET/HEAD requests.
pub trait Transport: Send + Sync {
    fn send(&self, config: RequestConfig) -> BoxFuture<'static, Result<Response, RequestError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, config: RequestConfig) -> BoxFuture<'static, Result<Response, RequestError>> {
        (**self).send(config)
    }
}

/// Clonable cancellation handle. Aborting makes the executor fail the
/// request with a TIMEOUT-classified error, mirroring how an aborted fetch
/// surfaces.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signals every clone; idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is cancelled; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // The sender lives as long as this handle, so this is unreachable;
        // pend rather than resolve spuriously.
        std::future::pending::<()>().await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
