//! The API-client factory: binds user-defined API types to one shared
//! runtime.
//!
//! An application defines one struct per API area, each holding a cheap clone
//! of the [`RequestCore`], implements [`ApiBinding`] for the bundle, and lets
//! [`ApiClient::new`] wire everything to a single runtime built from either a
//! transport or a pre-built core.

use std::ops::Deref;
use std::sync::Arc;

use reqpipe_core::{GlobalConfig, Interceptor, RequestError, Transport};

use crate::client::RequestCore;

/// A bundle of API objects constructed from a shared runtime handle.
pub trait ApiBinding {
    fn bind(core: RequestCore) -> Self;
}

/// Construction options for [`ApiClient::new`]. Exactly one of `transport`
/// and `core` must be supplied.
#[derive(Default)]
pub struct ApiClientOptions {
    pub transport: Option<Arc<dyn Transport>>,
    pub core: Option<RequestCore>,
    /// Global defaults; only used when building a fresh core.
    pub global: Option<GlobalConfig>,
    /// Interceptors; only used when building a fresh core, and override the
    /// list in `global` when non-empty.
    pub interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ApiClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn core(mut self, core: RequestCore) -> Self {
        self.core = Some(core);
        self
    }

    pub fn global(mut self, global: GlobalConfig) -> Self {
        self.global = Some(global);
        self
    }

    pub fn interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }
}

/// User API bundle plus the runtime's management surface (through `Deref`).
#[derive(Debug)]
pub struct ApiClient<A> {
    core: RequestCore,
    pub apis: A,
}

impl<A: ApiBinding> ApiClient<A> {
    pub fn new(options: ApiClientOptions) -> Result<Self, RequestError> {
        let core = match (options.transport, options.core) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(RequestError::validation(
                    "Must provide either requestor or requestCore option",
                ))
            }
            (Some(transport), None) => {
                let mut global = options.global.unwrap_or_default();
                if !options.interceptors.is_empty() {
                    global.interceptors = options.interceptors;
                }
                RequestCore::with_config(transport, global)
            }
            (None, Some(core)) => core,
        };

        Ok(Self {
            apis: A::bind(core.clone()),
            core,
        })
    }

    pub fn core(&self) -> &RequestCore {
        &self.core
    }
}

impl<A> Deref for ApiClient<A> {
    type Target = RequestCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}
