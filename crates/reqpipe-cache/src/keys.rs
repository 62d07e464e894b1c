//! Cache key derivation strategies.

use std::fmt;
use std::sync::Arc;

use reqpipe_core::canonical::{body_canonical, stable_stringify};
use reqpipe_core::RequestConfig;

/// How a request maps to a cache key.
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// The url with any query string stripped; params ignored.
    UrlPath,
    /// The url plus the canonical params.
    FullUrl,
    /// Method, url, canonical body and canonical params.
    #[default]
    Parameterized,
    /// User-supplied derivation.
    Custom(Arc<dyn Fn(&RequestConfig) -> String + Send + Sync>),
}

impl KeyStrategy {
    pub fn key_for(&self, config: &RequestConfig) -> String {
        match self {
            KeyStrategy::UrlPath => config
                .url
                .split('?')
                .next()
                .unwrap_or(config.url.as_str())
                .to_string(),
            KeyStrategy::FullUrl => {
                if config.params.is_empty() {
                    config.url.clone()
                } else {
                    format!("{}?{}", config.url, params_canonical(config))
                }
            }
            KeyStrategy::Parameterized => {
                let body = match &config.data {
                    Some(body) => stable_stringify(&body_canonical(body)),
                    None => "null".to_string(),
                };
                format!(
                    "{}:{}:{}:{}",
                    config.method,
                    config.url,
                    body,
                    params_canonical(config)
                )
            }
            KeyStrategy::Custom(f) => f(config),
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::UrlPath => f.write_str("UrlPath"),
            KeyStrategy::FullUrl => f.write_str("FullUrl"),
            KeyStrategy::Parameterized => f.write_str("Parameterized"),
            KeyStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn params_canonical(config: &RequestConfig) -> String {
    let map: serde_json::Map<String, serde_json::Value> = config
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    stable_stringify(&serde_json::Value::Object(map))
}
