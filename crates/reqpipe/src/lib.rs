//! Layered HTTP request runtime over a pluggable transport.
//!
//! `reqpipe` composes a uniform request pipeline — validation, global-config
//! merge, interceptors, one-shot execution — with five feature subsystems,
//! each available as its own crate and re-exported here:
//!
//! - **retry** ([`reqpipe_retry`]): policy-driven retry with exponential
//!   backoff and jitter
//! - **cache** ([`reqpipe_cache`]): TTL-bounded response cache with pluggable
//!   key strategies and eviction policies
//! - **idempotent** ([`reqpipe_idempotent`]): request coalescing — at most
//!   one in-flight transport call per key
//! - **concurrent** ([`reqpipe_concurrent`]): bounded-parallelism batches
//!   with fail-fast and batch timeouts
//! - **serial** ([`reqpipe_serial`]): per-key FIFO queues
//!
//! The runtime itself never opens sockets: it delegates "send one request" to
//! an injected [`Transport`]. See the `reqpipe-http` crate for a
//! reqwest-backed reference transport.
//!
//! # Quick start
//!
//! ```no_run
//! use reqpipe::{GlobalConfig, RequestCore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(transport: Arc<dyn reqpipe::Transport>) -> Result<(), reqpipe::RequestError> {
//! let core = RequestCore::with_config(
//!     transport,
//!     GlobalConfig::builder()
//!         .base_url("https://api.example.com")
//!         .timeout(Duration::from_secs(10))
//!         .build(),
//! );
//!
//! // Imperative
//! let users = core.get("/users").await?;
//!
//! // Declarative
//! #[derive(serde::Deserialize)]
//! struct User { id: u64 }
//! let user: User = core
//!     .create()
//!     .get("/users/1")
//!     .retry(2)
//!     .json::<User>()
//!     .send()
//!     .await?;
//! # let _ = (users, user);
//! # Ok(())
//! # }
//! ```

mod api;
mod builder;
mod client;
mod pagination;

pub use api::{ApiBinding, ApiClient, ApiClientOptions};
pub use builder::{BytesRequest, JsonRequest, RequestBuilder, TextRequest};
pub use client::{AllStats, BatchOptions, FileDownload, FileUpload, RequestCore};
pub use pagination::{Page, Pagination, SortOrder};

// The shared pipeline surface.
pub use reqpipe_core::{
    Body, CancelSignal, ConfigManager, ErrorContext, ErrorKind, ErrorOutcome, FnInterceptor,
    GlobalConfig, GlobalConfigBuilder, Headers, Interceptor, InterceptorChain, LifecycleHooks,
    Method, Part, PartData, RequestConfig, RequestError, RequestExecutor, Response, ResponseBody,
    ResponseKind, SerialOptions, Transport, ValidationError,
};

// Feature types.
pub use reqpipe_cache::{
    CacheEvent, CacheFeature, CacheOptions, CacheSettings, CacheStats, ClonePolicy,
    EvictionPolicy, KeyStrategy,
};
pub use reqpipe_concurrent::{
    failed_results, has_failures, successful_results, ConcurrencyFeature, ConcurrencyResult,
    ConcurrentOptions, ConcurrentStats, PostRequest,
};
pub use reqpipe_idempotent::{
    HashAlgorithm, IdempotencyFeature, IdempotentOptions, IdempotentStats,
    DEFAULT_IDEMPOTENT_METHODS,
};
pub use reqpipe_retry::{RetryEvent, RetryFeature, RetryPolicy, RetryPolicyBuilder};
pub use reqpipe_serial::{SerialQueueStats, SerialQueues, SerialStats};
