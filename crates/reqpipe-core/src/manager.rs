//! Global configuration, validation, merge, and URL resolution.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{GlobalConfig, RequestConfig};
use crate::error::{RequestError, ValidationError};
use crate::interceptor::InterceptorChain;

/// Owns the global defaults and the interceptor chain, and produces the
/// effective config the transport sees.
pub struct ConfigManager {
    global: RwLock<GlobalConfig>,
    chain: RwLock<Arc<InterceptorChain>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            global: RwLock::new(GlobalConfig::default()),
            chain: RwLock::new(Arc::new(InterceptorChain::empty())),
        }
    }

    /// Installs a new global config. The interceptor chain is replaced with
    /// exactly the supplied list.
    pub fn set_global(&self, global: GlobalConfig) {
        *self.chain.write() = Arc::new(InterceptorChain::new(global.interceptors.clone()));
        *self.global.write() = global;
    }

    /// Snapshot of the current global config.
    pub fn global(&self) -> GlobalConfig {
        self.global.read().clone()
    }

    /// The chain in effect right now. Requests hold the snapshot they started
    /// with, so a concurrent `set_global` does not tear a running pipeline.
    pub fn chain(&self) -> Arc<InterceptorChain> {
        self.chain.read().clone()
    }

    /// Validates a request and merges the global defaults under it.
    pub fn effective(&self, config: RequestConfig) -> Result<RequestConfig, RequestError> {
        validate(&config)?;
        let global = self.global.read();
        Ok(merge(&global, config))
    }

    /// Returns to the initial state: no global config, no interceptors.
    pub fn reset(&self) {
        *self.global.write() = GlobalConfig::default();
        *self.chain.write() = Arc::new(InterceptorChain::empty());
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects configs that cannot be sent.
pub fn validate(config: &RequestConfig) -> Result<(), ValidationError> {
    if config.url.trim().is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    Ok(())
}

/// Merges global defaults under a per-call config, producing the effective
/// config. Precedence low→high: global, per-call. Headers merge key-wise with
/// the per-call side winning; the url is resolved against the base url.
pub fn merge(global: &GlobalConfig, config: RequestConfig) -> RequestConfig {
    let mut effective = config;

    let mut headers = global.headers.clone();
    headers.merge(&effective.headers);
    effective.headers = headers;

    if effective.timeout.is_none() {
        effective.timeout = global.timeout;
    }
    effective.debug = effective.debug || global.debug;
    effective.url = resolve_url(global.base_url.as_deref(), &effective.url);

    effective
}

/// Resolves a request url against an optional base url. Absolute urls (those
/// carrying a scheme) pass through; relative urls join the base with exactly
/// one `/` separator.
pub fn resolve_url(base_url: Option<&str>, url: &str) -> String {
    if is_absolute(url) {
        return url.to_string();
    }
    match base_url {
        Some(base) if !base.is_empty() => {
            format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
        }
        _ => url.to_string(),
    }
}

fn is_absolute(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Method;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn empty_url_is_rejected() {
        let err = validate(&RequestConfig::new(Method::Get, "  ")).unwrap_err();
        assert_eq!(err, ValidationError::EmptyUrl);
        let as_request_error: RequestError = err.into();
        assert_eq!(as_request_error.kind, ErrorKind::Validation);
    }

    #[test]
    fn merge_with_empty_global_is_identity() {
        let global = GlobalConfig::default();
        let config = RequestConfig::new(Method::Post, "https://api.example.com/items")
            .with_header("x-one", "1")
            .with_param("q", "term")
            .with_timeout(Duration::from_secs(3));

        let merged = merge(&global, config.clone());
        assert_eq!(merged.url, config.url);
        assert_eq!(merged.headers, config.headers);
        assert_eq!(merged.params, config.params);
        assert_eq!(merged.timeout, config.timeout);
    }

    #[test]
    fn per_call_values_override_global() {
        let global = GlobalConfig::builder()
            .base_url("https://api.example.com")
            .timeout(Duration::from_secs(30))
            .header("accept", "text/plain")
            .header("x-app", "reqpipe")
            .build();

        let merged = merge(
            &global,
            RequestConfig::new(Method::Get, "/users")
                .with_header("Accept", "application/json")
                .with_timeout(Duration::from_secs(5)),
        );

        assert_eq!(merged.url, "https://api.example.com/users");
        assert_eq!(merged.headers.get("accept"), Some("application/json"));
        assert_eq!(merged.headers.get("x-app"), Some("reqpipe"));
        assert_eq!(merged.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn url_join_uses_exactly_one_separator() {
        assert_eq!(
            resolve_url(Some("https://a.example/"), "/path"),
            "https://a.example/path"
        );
        assert_eq!(
            resolve_url(Some("https://a.example"), "path"),
            "https://a.example/path"
        );
        assert_eq!(
            resolve_url(Some("https://a.example/"), "path"),
            "https://a.example/path"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        assert_eq!(
            resolve_url(Some("https://a.example"), "https://b.example/x"),
            "https://b.example/x"
        );
        assert_eq!(resolve_url(None, "/only/path"), "/only/path");
    }

    #[test]
    fn set_global_replaces_chain() {
        use crate::interceptor::FnInterceptor;

        let manager = ConfigManager::new();
        assert!(manager.chain().is_empty());

        manager.set_global(
            GlobalConfig::builder()
                .interceptor(FnInterceptor::new())
                .interceptor(FnInterceptor::new())
                .build(),
        );
        assert_eq!(manager.chain().len(), 2);

        manager.set_global(GlobalConfig::builder().interceptor(FnInterceptor::new()).build());
        assert_eq!(manager.chain().len(), 1);

        manager.reset();
        assert!(manager.chain().is_empty());
        assert!(manager.global().base_url.is_none());
    }
}
