//! The public runtime facade.
//!
//! [`RequestCore`] owns one instance of every feature subsystem over a shared
//! executor and exposes the whole request surface: verb helpers, content-type
//! helpers, file transfer, pagination, batching, per-feature operations,
//! statistics and lifecycle. Cloning a `RequestCore` is cheap and shares all
//! state, which is how an application hands "the" runtime to its API layers.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use reqpipe_cache::{CacheFeature, CacheOptions, CacheSettings, CacheStats};
use reqpipe_concurrent::{
    ConcurrencyFeature, ConcurrencyResult, ConcurrentOptions, ConcurrentStats, PostRequest,
};
use reqpipe_core::{
    Body, ConfigManager, GlobalConfig, Method, Part, PartData, RequestConfig, RequestError,
    RequestExecutor, Response, ResponseBody, ResponseKind, Transport,
};
use reqpipe_idempotent::{IdempotencyFeature, IdempotentOptions, IdempotentStats};
use reqpipe_retry::{RetryFeature, RetryPolicy};
use reqpipe_serial::{SerialQueues, SerialStats};

use crate::builder::RequestBuilder;
use crate::pagination::{parse_page, Page, Pagination, DEFAULT_LIMIT, DEFAULT_PAGE};

/// A file (or arbitrary payload) to upload as multipart form data.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub data: PartData,
    /// Form field name; defaults to "file".
    pub field_name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Extra text fields sent alongside the file.
    pub additional_data: Vec<(String, String)>,
}

impl FileUpload {
    pub fn new(data: PartData) -> Self {
        Self {
            data,
            field_name: "file".to_string(),
            filename: None,
            content_type: None,
            additional_data: Vec::new(),
        }
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.push((name.into(), value.into()));
        self
    }
}

/// A downloaded payload with its resolved filename.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDownload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Options for [`RequestCore::batch_requests`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub concurrency: Option<usize>,
    /// Collect per-task failures instead of rejecting the batch on the first
    /// one.
    pub ignore_errors: bool,
}

/// Composition of every subsystem's statistics.
#[derive(Debug, Clone, Default)]
pub struct AllStats {
    pub cache: CacheStats,
    pub concurrent: ConcurrentStats,
    pub idempotent: IdempotentStats,
    pub serial: SerialStats,
}

pub(crate) struct CoreInner {
    pub(crate) manager: Arc<ConfigManager>,
    pub(crate) executor: Arc<RequestExecutor>,
    pub(crate) retry: RetryFeature,
    pub(crate) cache: CacheFeature,
    pub(crate) idempotent: IdempotencyFeature,
    pub(crate) concurrent: ConcurrencyFeature,
    pub(crate) serial: SerialQueues,
}

/// The request runtime: a configured pipeline over an injected transport.
#[derive(Clone)]
pub struct RequestCore {
    inner: Arc<CoreInner>,
}

impl std::fmt::Debug for RequestCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCore").finish_non_exhaustive()
    }
}

impl RequestCore {
    /// A runtime over `transport` with no global config.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, GlobalConfig::default())
    }

    /// A runtime over `transport` with the given global defaults installed.
    pub fn with_config(transport: Arc<dyn Transport>, global: GlobalConfig) -> Self {
        Self::assemble(transport, global, CacheSettings::default())
    }

    /// Full construction: global defaults plus feature-level cache settings.
    pub fn assemble(
        transport: Arc<dyn Transport>,
        global: GlobalConfig,
        cache_settings: CacheSettings,
    ) -> Self {
        let manager = Arc::new(ConfigManager::new());
        let executor = Arc::new(RequestExecutor::new(transport, Arc::clone(&manager)));
        let inner = Arc::new(CoreInner {
            manager,
            executor: Arc::clone(&executor),
            retry: RetryFeature::new(Arc::clone(&executor)),
            cache: CacheFeature::with_settings(Arc::clone(&executor), cache_settings),
            idempotent: IdempotencyFeature::new(Arc::clone(&executor)),
            concurrent: ConcurrencyFeature::new(executor),
            serial: SerialQueues::new(),
        });
        let core = Self { inner };
        core.set_global_config(global);
        core
    }

    /// Installs new global defaults; the interceptor chain becomes exactly
    /// the supplied list, and the idempotent method set follows the config.
    pub fn set_global_config(&self, global: GlobalConfig) {
        match &global.idempotent_methods {
            Some(methods) => self.inner.idempotent.set_methods(methods.clone()),
            None => self
                .inner
                .idempotent
                .set_methods(reqpipe_idempotent::DEFAULT_IDEMPOTENT_METHODS.to_vec()),
        }
        self.inner.manager.set_global(global);
    }

    pub fn global_config(&self) -> GlobalConfig {
        self.inner.manager.global()
    }

    /// Swaps the transport, preserving interceptors, global config and all
    /// feature state (serial queues included). Returns the previous one.
    pub fn switch_transport(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        self.inner.executor.swap_transport(transport)
    }

    /// Starts a fluent request builder bound to this runtime.
    pub fn create(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(self)
    }

    // --- base operations -------------------------------------------------

    /// Sends one request. A non-empty `serial_key` routes it through the
    /// serial queue for that key; otherwise global defaults decide which
    /// feature (retry, cache, idempotency) wraps the executor.
    pub async fn request(&self, config: RequestConfig) -> Result<Response, RequestError> {
        let result = match config.serial_key.clone().filter(|k| !k.is_empty()) {
            Some(key) => {
                let options = config.serial.clone();
                let inner = Arc::clone(&self.inner);
                self.inner
                    .serial
                    .submit(&key, options.as_ref(), move || {
                        Self::dispatch(inner, config)
                    })
                    .await
            }
            None => Self::dispatch(Arc::clone(&self.inner), config).await,
        };
        result.map(unwrap_response)
    }

    /// Alias of [`RequestCore::request`].
    pub async fn execute(&self, config: RequestConfig) -> Result<Response, RequestError> {
        self.request(config).await
    }

    /// Feature dispatch for plain requests, priority retry > cache >
    /// idempotent > plain, driven by the global defaults.
    async fn dispatch(
        inner: Arc<CoreInner>,
        config: RequestConfig,
    ) -> Result<Arc<Response>, RequestError> {
        let global = inner.manager.global();

        if global.retries > 0 {
            let policy = RetryPolicy::new(global.retries);
            return inner
                .retry
                .request_with_retry(config, &policy)
                .await
                .map(Arc::new);
        }
        if global.cache_enabled {
            return inner
                .cache
                .request_with_cache(config, &CacheOptions::default())
                .await;
        }
        if global.idempotent_enabled && inner.idempotent.methods().contains(&config.method) {
            let mut options = IdempotentOptions::default();
            if let Some(ttl) = global.idempotent_ttl {
                options.ttl = ttl;
            }
            return inner.idempotent.request_idempotent(config, &options).await;
        }
        inner.executor.execute(config).await.map(Arc::new)
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Response, RequestError> {
        self.request(RequestConfig::new(Method::Get, url)).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        data: Option<Body>,
    ) -> Result<Response, RequestError> {
        let mut config = RequestConfig::new(Method::Post, url);
        config.data = data;
        self.request(config).await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        data: Option<Body>,
    ) -> Result<Response, RequestError> {
        let mut config = RequestConfig::new(Method::Put, url);
        config.data = data;
        self.request(config).await
    }

    pub async fn patch(
        &self,
        url: impl Into<String>,
        data: Option<Body>,
    ) -> Result<Response, RequestError> {
        let mut config = RequestConfig::new(Method::Patch, url);
        config.data = data;
        self.request(config).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<Response, RequestError> {
        self.request(RequestConfig::new(Method::Delete, url)).await
    }

    pub async fn head(&self, url: impl Into<String>) -> Result<Response, RequestError> {
        self.request(RequestConfig::new(Method::Head, url)).await
    }

    pub async fn options(&self, url: impl Into<String>) -> Result<Response, RequestError> {
        self.request(RequestConfig::new(Method::Options, url)).await
    }

    // --- content-type helpers --------------------------------------------

    /// POST with a JSON body and `Content-Type: application/json`.
    pub async fn post_json(
        &self,
        url: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Response, RequestError> {
        let config = RequestConfig::new(Method::Post, url)
            .with_header("content-type", "application/json")
            .with_data(Body::Json(value));
        self.request(config).await
    }

    /// PUT with a JSON body and `Content-Type: application/json`.
    pub async fn put_json(
        &self,
        url: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Response, RequestError> {
        let config = RequestConfig::new(Method::Put, url)
            .with_header("content-type", "application/json")
            .with_data(Body::Json(value));
        self.request(config).await
    }

    /// POST with url-encoded form fields.
    pub async fn post_form(
        &self,
        url: impl Into<String>,
        fields: Vec<(String, String)>,
    ) -> Result<Response, RequestError> {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let config = RequestConfig::new(Method::Post, url)
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_data(Body::Text(encoded));
        self.request(config).await
    }

    // --- file transfer ----------------------------------------------------

    /// POST a multipart body carrying the file plus any additional fields.
    pub async fn upload_file(
        &self,
        url: impl Into<String>,
        upload: FileUpload,
    ) -> Result<Response, RequestError> {
        let mut parts = vec![Part {
            name: upload.field_name,
            filename: upload.filename,
            content_type: upload.content_type,
            data: upload.data,
        }];
        for (name, value) in upload.additional_data {
            parts.push(Part {
                name,
                filename: None,
                content_type: None,
                data: PartData::Text(value),
            });
        }
        let config = RequestConfig::new(Method::Post, url).with_data(Body::Multipart(parts));
        self.request(config).await
    }

    /// GET forced to a binary response; the filename falls back to the last
    /// url segment.
    pub async fn download_file(
        &self,
        url: impl Into<String>,
        filename: Option<&str>,
    ) -> Result<FileDownload, RequestError> {
        let url = url.into();
        let config =
            RequestConfig::new(Method::Get, url.clone()).with_response_kind(ResponseKind::Bytes);
        let response = self.request(config).await?;

        let resolved = filename
            .map(str::to_owned)
            .or_else(|| {
                url.split('?')
                    .next()
                    .and_then(|path| path.rsplit('/').next())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "download".to_string());

        let content_type = response.headers.get("content-type").map(str::to_owned);
        let data = match response.body {
            ResponseBody::Bytes(bytes) => bytes,
            ResponseBody::Text(text) => text.into_bytes(),
            ResponseBody::Json(value) => value.to_string().into_bytes(),
            ResponseBody::Empty => Vec::new(),
        };

        Ok(FileDownload {
            filename: resolved,
            content_type,
            data,
        })
    }

    // --- pagination -------------------------------------------------------

    /// GET a page of a listing. Empty pagination means page 1 with the
    /// default limit.
    pub async fn get_paginated<U: DeserializeOwned>(
        &self,
        url: impl Into<String>,
        pagination: Pagination,
    ) -> Result<Page<U>, RequestError> {
        let page = pagination.page.unwrap_or(DEFAULT_PAGE);
        let limit = pagination.limit.unwrap_or(DEFAULT_LIMIT);

        let mut config = RequestConfig::new(Method::Get, url)
            .with_param("page", page)
            .with_param("limit", limit);
        if let Some(offset) = pagination.offset {
            config = config.with_param("offset", offset);
        }
        if let Some(size) = pagination.size {
            config = config.with_param("size", size);
        }
        if let Some(sort) = &pagination.sort {
            config = config.with_param("sort", sort.as_str());
        }
        if let Some(order) = pagination.order {
            config = config.with_param("order", order.as_str());
        }

        let response = self.request(config).await?;
        parse_page(&response, page, limit)
    }

    // --- feature operations ----------------------------------------------

    pub async fn request_with_retry(
        &self,
        config: RequestConfig,
        policy: &RetryPolicy,
    ) -> Result<Response, RequestError> {
        self.inner.retry.request_with_retry(config, policy).await
    }

    pub async fn request_with_cache(
        &self,
        config: RequestConfig,
        options: &CacheOptions,
    ) -> Result<Arc<Response>, RequestError> {
        self.inner.cache.request_with_cache(config, options).await
    }

    pub async fn request_idempotent(
        &self,
        config: RequestConfig,
        options: &IdempotentOptions,
    ) -> Result<Arc<Response>, RequestError> {
        self.inner.idempotent.request_idempotent(config, options).await
    }

    pub async fn request_concurrent(
        &self,
        configs: Vec<RequestConfig>,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        self.inner.concurrent.request_concurrent(configs, options).await
    }

    pub async fn request_multiple(
        &self,
        config: RequestConfig,
        count: isize,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        self.inner
            .concurrent
            .request_multiple(config, count, options)
            .await
    }

    pub async fn get_concurrent<I, S>(
        &self,
        urls: I,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.concurrent.get_concurrent(urls, options).await
    }

    pub async fn post_concurrent(
        &self,
        requests: Vec<PostRequest>,
        options: &ConcurrentOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        self.inner.concurrent.post_concurrent(requests, options).await
    }

    /// Convenience batch over the concurrency pool. `ignore_errors` collects
    /// per-task outcomes; otherwise the first failure rejects the batch.
    pub async fn batch_requests(
        &self,
        configs: Vec<RequestConfig>,
        options: BatchOptions,
    ) -> Result<Vec<ConcurrencyResult>, RequestError> {
        let mut concurrent = ConcurrentOptions::new().fail_fast(!options.ignore_errors);
        concurrent.max_concurrency = options.concurrency;
        self.inner
            .concurrent
            .request_concurrent(configs, &concurrent)
            .await
    }

    // --- maintenance ------------------------------------------------------

    /// Removes one cached response, or all of them.
    pub fn clear_cache(&self, key: Option<&str>) -> bool {
        self.inner.cache.clear(key)
    }

    /// Removes one settled idempotent result, or all of them.
    pub fn clear_idempotent_cache(&self, key: Option<&str>) -> bool {
        self.inner.idempotent.clear(key)
    }

    /// Rejects the pending tasks of one serial queue. Returns whether the
    /// queue existed.
    pub fn clear_serial_queue(&self, key: &str) -> bool {
        self.inner.serial.clear(key)
    }

    /// Clears and deletes one serial queue. Returns whether it existed.
    pub fn remove_serial_queue(&self, key: &str) -> bool {
        self.inner.serial.remove(key)
    }

    pub fn clear_all_serial_queues(&self) {
        self.inner.serial.clear_all()
    }

    pub fn remove_all_serial_queues(&self) {
        self.inner.serial.remove_all()
    }

    // --- statistics -------------------------------------------------------

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn concurrent_stats(&self) -> ConcurrentStats {
        self.inner.concurrent.stats()
    }

    pub fn idempotent_stats(&self) -> IdempotentStats {
        self.inner.idempotent.stats()
    }

    pub fn serial_stats(&self) -> SerialStats {
        self.inner.serial.stats()
    }

    pub fn all_stats(&self) -> AllStats {
        AllStats {
            cache: self.cache_stats(),
            concurrent: self.concurrent_stats(),
            idempotent: self.idempotent_stats(),
            serial: self.serial_stats(),
        }
    }

    // --- lifecycle --------------------------------------------------------

    /// Stops the cache sweeper, drops cached and coalesced results, rejects
    /// pending serial tasks and resets the global config. In-flight transport
    /// calls are abandoned: they may finish, their results are discarded.
    /// Calling this twice is the same as calling it once.
    pub fn destroy(&self) {
        self.inner.cache.shutdown();
        self.inner.idempotent.clear(None);
        self.inner.serial.remove_all();
        self.inner.manager.reset();
    }
}

fn unwrap_response(response: Arc<Response>) -> Response {
    Arc::try_unwrap(response).unwrap_or_else(|shared| (*shared).clone())
}
