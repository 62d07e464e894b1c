//! The fluent request builder.
//!
//! Accumulates a request piecewise (headers and params merge across repeated
//! calls, later wins), records at most one feature intent, and dispatches on
//! `send()` through the highest-priority recorded feature:
//! retry > cache > idempotent > plain. Typed response stages reparameterise
//! what `send()` returns.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use reqpipe_cache::CacheOptions;
use reqpipe_core::{
    Body, CancelSignal, ErrorKind, Method, RequestConfig, RequestError, Response, ResponseBody,
    ResponseKind,
};
use reqpipe_idempotent::IdempotentOptions;
use reqpipe_retry::RetryPolicy;

use crate::client::RequestCore;

/// Builder for one request; obtained from [`RequestCore::create`].
pub struct RequestBuilder<'a> {
    core: &'a RequestCore,
    url: Option<String>,
    base: RequestConfig,
    retry: Option<RetryPolicy>,
    cache: Option<CacheOptions>,
    idempotent: Option<IdempotentOptions>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(core: &'a RequestCore) -> Self {
        Self {
            core,
            url: None,
            base: RequestConfig::new(Method::Get, ""),
            retry: None,
            cache: None,
            idempotent: None,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.base.method = method;
        self
    }

    /// Shorthand for `.method(Method::Get).url(url)`.
    pub fn get(self, url: impl Into<String>) -> Self {
        self.method(Method::Get).url(url)
    }

    /// Shorthand for `.method(Method::Post).url(url)`.
    pub fn post(self, url: impl Into<String>) -> Self {
        self.method(Method::Post).url(url)
    }

    pub fn data(mut self, body: Body) -> Self {
        self.base.data = Some(body);
        self
    }

    /// Adds one query param; repeated calls merge, later wins on conflict.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.base.params.insert(name.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        for (name, value) in params {
            self.base.params.insert(name.into(), value.into());
        }
        self
    }

    /// Adds one header; repeated calls merge, later wins on conflict.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.base.headers.insert(name, value);
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.base.headers.insert(name, value);
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.base.timeout = Some(timeout);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.base.tag = Some(tag.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.base.debug = debug;
        self
    }

    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.base.signal = Some(signal);
        self
    }

    pub fn serial_key(mut self, key: impl Into<String>) -> Self {
        self.base.serial_key = Some(key.into());
        self
    }

    pub fn metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.base.metadata.insert(key.into(), value.into());
        self
    }

    // --- feature intents --------------------------------------------------

    /// Retry up to `retries` times with the default policy.
    pub fn retry(mut self, retries: u32) -> Self {
        self.retry = Some(RetryPolicy::new(retries));
        self
    }

    pub fn retry_with(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Cache with the default TTL.
    pub fn cache(mut self) -> Self {
        self.cache = Some(CacheOptions::default());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Some(CacheOptions::new().ttl(ttl));
        self
    }

    pub fn cache_with(mut self, options: CacheOptions) -> Self {
        self.cache = Some(options);
        self
    }

    /// Coalesce with the default TTL.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = Some(IdempotentOptions::default());
        self
    }

    pub fn idempotent_ttl(mut self, ttl: Duration) -> Self {
        self.idempotent = Some(IdempotentOptions::new().ttl(ttl));
        self
    }

    pub fn idempotent_with(mut self, options: IdempotentOptions) -> Self {
        self.idempotent = Some(options);
        self
    }

    // --- response stages --------------------------------------------------

    /// Decode the response body as JSON into `U`.
    pub fn json<U: DeserializeOwned>(mut self) -> JsonRequest<'a, U> {
        self.base.response_kind = ResponseKind::Json;
        JsonRequest {
            inner: self,
            _marker: PhantomData,
        }
    }

    /// Take the response body as text.
    pub fn text(mut self) -> TextRequest<'a> {
        self.base.response_kind = ResponseKind::Text;
        TextRequest { inner: self }
    }

    /// Take the response body as raw bytes.
    pub fn bytes(mut self) -> BytesRequest<'a> {
        self.base.response_kind = ResponseKind::Bytes;
        BytesRequest { inner: self }
    }

    /// Sends through the highest-priority recorded feature.
    pub async fn send(self) -> Result<Response, RequestError> {
        let Self {
            core,
            url,
            mut base,
            retry,
            cache,
            idempotent,
        } = self;

        match url {
            Some(url) if !url.trim().is_empty() => base.url = url,
            _ => {
                return Err(RequestError::validation("URL is required").with_code("BUILDER_NO_URL"))
            }
        }

        if let Some(policy) = retry {
            core.request_with_retry(base, &policy).await
        } else if let Some(options) = cache {
            core.request_with_cache(base, &options)
                .await
                .map(unshare)
        } else if let Some(options) = idempotent {
            core.request_idempotent(base, &options)
                .await
                .map(unshare)
        } else {
            core.request(base).await
        }
    }
}

/// Builder stage returning a decoded JSON value.
pub struct JsonRequest<'a, U> {
    inner: RequestBuilder<'a>,
    _marker: PhantomData<U>,
}

impl<U: DeserializeOwned> JsonRequest<'_, U> {
    pub async fn send(self) -> Result<U, RequestError> {
        let response = self.inner.send().await?;
        decode_json(response)
    }
}

/// Builder stage returning the body as text.
pub struct TextRequest<'a> {
    inner: RequestBuilder<'a>,
}

impl TextRequest<'_> {
    pub async fn send(self) -> Result<String, RequestError> {
        let response = self.inner.send().await?;
        match response.body {
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Json(value) => Ok(value.to_string()),
            ResponseBody::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| {
                RequestError::new(ErrorKind::Unknown, format!("body is not valid utf-8: {e}"))
            }),
            ResponseBody::Empty => Ok(String::new()),
        }
    }
}

/// Builder stage returning the body as bytes.
pub struct BytesRequest<'a> {
    inner: RequestBuilder<'a>,
}

impl BytesRequest<'_> {
    pub async fn send(self) -> Result<Vec<u8>, RequestError> {
        let response = self.inner.send().await?;
        Ok(match response.body {
            ResponseBody::Bytes(bytes) => bytes,
            ResponseBody::Text(text) => text.into_bytes(),
            ResponseBody::Json(value) => value.to_string().into_bytes(),
            ResponseBody::Empty => Vec::new(),
        })
    }
}

fn decode_json<U: DeserializeOwned>(response: Response) -> Result<U, RequestError> {
    match response.body {
        ResponseBody::Json(value) => serde_json::from_value(value).map_err(|e| {
            RequestError::new(ErrorKind::Unknown, format!("failed to decode json body: {e}"))
        }),
        ResponseBody::Text(text) => serde_json::from_str(&text).map_err(|e| {
            RequestError::new(ErrorKind::Unknown, format!("failed to decode json body: {e}"))
        }),
        _ => Err(RequestError::new(
            ErrorKind::Unknown,
            "response body is not json",
        )),
    }
}

fn unshare(response: Arc<Response>) -> Response {
    Arc::try_unwrap(response).unwrap_or_else(|shared| (*shared).clone())
}
