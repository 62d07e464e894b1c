//! The interceptor chain.
//!
//! Interceptors run in insertion order around every request. Each phase is a
//! straight-line fold: the value returned by one handler becomes the input of
//! the next. Handlers return boxed futures, so synchronous handlers are just
//! ready futures.

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::config::RequestConfig;
use crate::error::RequestError;
use crate::transport::Response;

/// Outcome of an error-phase handler.
pub enum ErrorOutcome {
    /// The handler recovered; the value is treated as the successful response
    /// and the rest of the chain is skipped.
    Recovered(Response),
    /// The handler re-raised; the new error replaces the old one and travels
    /// to the next handler.
    Raise(RequestError),
}

/// A handler with optional request, response and error phases.
///
/// All phases default to pass-through, so implementations only override the
/// phases they care about.
pub trait Interceptor: Send + Sync {
    /// Transforms the outgoing config. A failure here aborts the pre-send
    /// phase; the transport is never invoked.
    fn on_request<'a>(
        &'a self,
        config: RequestConfig,
    ) -> BoxFuture<'a, Result<RequestConfig, RequestError>> {
        Box::pin(std::future::ready(Ok(config)))
    }

    /// Transforms the incoming response. A failure here enters the error
    /// phase.
    fn on_response<'a>(
        &'a self,
        response: Response,
        _config: &'a RequestConfig,
    ) -> BoxFuture<'a, Result<Response, RequestError>> {
        Box::pin(std::future::ready(Ok(response)))
    }

    /// Observes or transforms a failure; may recover with a response.
    fn on_error<'a>(
        &'a self,
        error: RequestError,
        _config: &'a RequestConfig,
    ) -> BoxFuture<'a, ErrorOutcome> {
        Box::pin(std::future::ready(ErrorOutcome::Raise(error)))
    }
}

type RequestFn = dyn Fn(RequestConfig) -> Result<RequestConfig, RequestError> + Send + Sync;
type ResponseFn = dyn Fn(Response, &RequestConfig) -> Result<Response, RequestError> + Send + Sync;
type ErrorFn = dyn Fn(RequestError, &RequestConfig) -> ErrorOutcome + Send + Sync;

/// Closure-backed interceptor for the common synchronous case.
#[derive(Default)]
pub struct FnInterceptor {
    on_request: Option<Arc<RequestFn>>,
    on_response: Option<Arc<ResponseFn>>,
    on_error: Option<Arc<ErrorFn>>,
}

impl FnInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(RequestConfig) -> Result<RequestConfig, RequestError> + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(f));
        self
    }

    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(Response, &RequestConfig) -> Result<Response, RequestError> + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(RequestError, &RequestConfig) -> ErrorOutcome + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl Interceptor for FnInterceptor {
    fn on_request<'a>(
        &'a self,
        config: RequestConfig,
    ) -> BoxFuture<'a, Result<RequestConfig, RequestError>> {
        let result = match &self.on_request {
            Some(f) => f(config),
            None => Ok(config),
        };
        Box::pin(std::future::ready(result))
    }

    fn on_response<'a>(
        &'a self,
        response: Response,
        config: &'a RequestConfig,
    ) -> BoxFuture<'a, Result<Response, RequestError>> {
        let result = match &self.on_response {
            Some(f) => f(response, config),
            None => Ok(response),
        };
        Box::pin(std::future::ready(result))
    }

    fn on_error<'a>(
        &'a self,
        error: RequestError,
        config: &'a RequestConfig,
    ) -> BoxFuture<'a, ErrorOutcome> {
        let outcome = match &self.on_error {
            Some(f) => f(error, config),
            None => ErrorOutcome::Raise(error),
        };
        Box::pin(std::future::ready(outcome))
    }
}

/// Ordered list of interceptors. Rebuilt whenever the global config changes.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Pre-send phase. The first failure aborts the fold.
    pub async fn run_request(
        &self,
        mut config: RequestConfig,
    ) -> Result<RequestConfig, RequestError> {
        for interceptor in &self.interceptors {
            config = interceptor.on_request(config).await?;
        }
        Ok(config)
    }

    /// Post-receive phase. The first failure aborts the fold.
    pub async fn run_response(
        &self,
        mut response: Response,
        config: &RequestConfig,
    ) -> Result<Response, RequestError> {
        for interceptor in &self.interceptors {
            response = interceptor.on_response(response, config).await?;
        }
        Ok(response)
    }

    /// Error phase. Handlers run in order; a re-raise replaces the error for
    /// the next handler, the first recovery terminates the chain.
    pub async fn run_error(&self, mut error: RequestError, config: &RequestConfig) -> ErrorOutcome {
        for interceptor in &self.interceptors {
            match interceptor.on_error(error, config).await {
                ErrorOutcome::Recovered(response) => return ErrorOutcome::Recovered(response),
                ErrorOutcome::Raise(next) => error = next,
            }
        }
        ErrorOutcome::Raise(error)
    }
}
