//! Request and global configuration types.
//!
//! [`RequestConfig`] is the unit of work handed to the pipeline; it is treated
//! as immutable once it reaches the executor (interceptors produce new
//! configs). [`GlobalConfig`] holds the defaults merged under every request by
//! the [`ConfigManager`](crate::manager::ConfigManager).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RequestError, ValidationError};
use crate::interceptor::Interceptor;
use crate::transport::CancelSignal;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// GET and HEAD requests never carry a body on the wire.
    pub fn allows_body(&self) -> bool {
        !matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(ValidationError::UnknownMethod(other.to_string())),
        }
    }
}

/// Case-insensitive header map. Keys are stored lowercase; merge is key-wise
/// with the incoming side winning on conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Merges `other` into `self`; entries from `other` win on conflict.
    pub fn merge(&mut self, other: &Headers) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a header name carries credentials and must be redacted in logs.
    pub fn is_sensitive(name: &str) -> bool {
        let n = name.to_ascii_lowercase();
        n.contains("authorization") || n.contains("token") || n.contains("key")
    }

    /// A copy with sensitive values replaced, for debug output.
    pub fn redacted(&self) -> Headers {
        let mut out = Headers::new();
        for (k, v) in self.iter() {
            if Self::is_sensitive(k) {
                out.insert(k, "***");
            } else {
                out.insert(k, v);
            }
        }
        out
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: PartData,
}

/// Payload of a multipart [`Part`].
#[derive(Debug, Clone, PartialEq)]
pub enum PartData {
    Text(String),
    Bytes(Vec<u8>),
}

impl PartData {
    pub fn len(&self) -> usize {
        match self {
            PartData::Text(t) => t.len(),
            PartData::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request body. Absence is modelled as `Option<Body>::None` on the config.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
    Form(Vec<(String, String)>),
    Multipart(Vec<Part>),
}

/// How the response payload should be decoded by the transport.
///
/// Rust has a single owned binary representation, so the source notions of
/// "blob" and "arraybuffer" both decode as [`ResponseKind::Bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Json,
    Text,
    Bytes,
}

/// Per-request lifecycle callbacks. Panics raised by a hook are caught and
/// logged by the executor; they never replace the request outcome.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub on_start: Option<Arc<dyn Fn(&RequestConfig) + Send + Sync>>,
    pub on_end: Option<Arc<dyn Fn(&RequestConfig, Duration) + Send + Sync>>,
    pub on_error: Option<Arc<dyn Fn(&RequestConfig, &RequestError, Duration) + Send + Sync>>,
}

impl LifecycleHooks {
    pub fn is_empty(&self) -> bool {
        self.on_start.is_none() && self.on_end.is_none() && self.on_error.is_none()
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Configuration for the serial queue a request creates on first submission.
/// Later submissions to the same key inherit the original queue's config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialOptions {
    /// Submissions beyond this bound fail immediately.
    pub max_queue_size: Option<usize>,
    /// Per-task execution limit once the task starts.
    pub timeout: Option<Duration>,
}

/// The unit of work: one request as configured by the caller.
#[derive(Clone)]
pub struct RequestConfig {
    pub url: String,
    pub method: Method,
    pub data: Option<Body>,
    pub params: BTreeMap<String, serde_json::Value>,
    pub headers: Headers,
    /// `None` and `Duration::ZERO` both mean "no limit".
    pub timeout: Option<Duration>,
    pub signal: Option<CancelSignal>,
    pub response_kind: ResponseKind,
    pub debug: bool,
    pub tag: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Non-empty key routes the request through the serial queue of that key.
    pub serial_key: Option<String>,
    pub serial: Option<SerialOptions>,
    pub hooks: LifecycleHooks,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            data: None,
            params: BTreeMap::new(),
            headers: Headers::new(),
            timeout: None,
            signal: None,
            response_kind: ResponseKind::default(),
            debug: false,
            tag: None,
            metadata: BTreeMap::new(),
            serial_key: None,
            serial: None,
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_data(mut self, body: Body) -> Self {
        self.data = Some(body);
        self
    }

    pub fn with_json(self, value: serde_json::Value) -> Self {
        self.with_data(Body::Json(value))
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Inserts the param only when present; `None` entries are elided before
    /// the transport ever sees the config. An explicit JSON `null` survives.
    pub fn with_param_opt(
        mut self,
        name: impl Into<String>,
        value: Option<impl Into<serde_json::Value>>,
    ) -> Self {
        if let Some(v) = value {
            self.params.insert(name.into(), v.into());
        }
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_response_kind(mut self, kind: ResponseKind) -> Self {
        self.response_kind = kind;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_serial_key(mut self, key: impl Into<String>) -> Self {
        self.serial_key = Some(key.into());
        self
    }

    pub fn with_serial_options(mut self, options: SerialOptions) -> Self {
        self.serial = Some(options);
        self
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// The effective timeout: `Duration::ZERO` is normalised to "none".
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("data", &self.data)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("response_kind", &self.response_kind)
            .field("debug", &self.debug)
            .field("tag", &self.tag)
            .field("serial_key", &self.serial_key)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Defaults merged under every request.
#[derive(Clone, Default)]
pub struct GlobalConfig {
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub headers: Headers,
    pub debug: bool,
    /// Non-zero routes plain `request` calls through the retry feature.
    pub retries: u32,
    pub cache_enabled: bool,
    pub idempotent_enabled: bool,
    pub idempotent_ttl: Option<Duration>,
    /// Methods eligible for coalescing; `None` uses the feature default.
    pub idempotent_methods: Option<Vec<Method>>,
    /// Replaces the interceptor chain wholesale when the global config is set.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl GlobalConfig {
    pub fn builder() -> GlobalConfigBuilder {
        GlobalConfigBuilder::default()
    }
}

impl fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("debug", &self.debug)
            .field("retries", &self.retries)
            .field("cache_enabled", &self.cache_enabled)
            .field("idempotent_enabled", &self.idempotent_enabled)
            .field("idempotent_ttl", &self.idempotent_ttl)
            .field("idempotent_methods", &self.idempotent_methods)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// Builder for [`GlobalConfig`].
#[derive(Default)]
pub struct GlobalConfigBuilder {
    config: GlobalConfig,
}

impl GlobalConfigBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    pub fn idempotent_enabled(mut self, enabled: bool) -> Self {
        self.config.idempotent_enabled = enabled;
        self
    }

    pub fn idempotent_ttl(mut self, ttl: Duration) -> Self {
        self.config.idempotent_ttl = Some(ttl);
        self
    }

    pub fn idempotent_methods(mut self, methods: Vec<Method>) -> Self {
        self.config.idempotent_methods = Some(methods);
        self
    }

    pub fn interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.config.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> GlobalConfig {
        self.config
    }
}
