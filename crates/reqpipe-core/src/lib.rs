//! Core request pipeline for the `reqpipe` runtime.
//!
//! This crate holds everything the feature crates share: the request/global
//! configuration model, the unified error model, the interceptor chain, the
//! transport seam, and the one-shot request executor. The feature crates
//! (retry, cache, idempotent, concurrent, serial) each wrap the
//! [`RequestExecutor`] without knowing about one another.
//!
//! # Example
//!
//! ```
//! use reqpipe_core::{
//!     ConfigManager, Method, RequestConfig, RequestError, RequestExecutor, Response, Transport,
//! };
//! use futures::future::BoxFuture;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Transport for Echo {
//!     fn send(
//!         &self,
//!         config: RequestConfig,
//!     ) -> BoxFuture<'static, Result<Response, RequestError>> {
//!         Box::pin(async move { Ok(Response::json(serde_json::json!({ "url": config.url }))) })
//!     }
//! }
//!
//! # async fn example() -> Result<(), RequestError> {
//! let executor = RequestExecutor::new(Arc::new(Echo), Arc::new(ConfigManager::new()));
//! let response = executor
//!     .execute(RequestConfig::new(Method::Get, "https://api.example.com/ping"))
//!     .await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod interceptor;
pub mod manager;
pub mod transport;

pub use config::{
    Body, GlobalConfig, GlobalConfigBuilder, Headers, LifecycleHooks, Method, Part, PartData,
    RequestConfig, ResponseKind, SerialOptions,
};
pub use error::{infer_kind, ErrorContext, ErrorKind, RequestError, ValidationError};
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, RuntimeEvent};
pub use executor::RequestExecutor;
pub use interceptor::{ErrorOutcome, FnInterceptor, Interceptor, InterceptorChain};
pub use manager::{merge, resolve_url, validate, ConfigManager};
pub use transport::{CancelSignal, Response, ResponseBody, Transport};
