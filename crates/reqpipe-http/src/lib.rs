//! reqwest-backed reference [`Transport`] for the reqpipe runtime.
//!
//! Maps the effective [`RequestConfig`] onto a `reqwest` request: params
//! become the query string, the body is encoded per its variant (GET and HEAD
//! never carry one), statuses >= 400 become HTTP-classified failures, and the
//! payload is decoded per the configured [`ResponseKind`]. The cancel signal
//! is honoured by dropping the in-flight reqwest future, which aborts the
//! connection.

use futures::future::BoxFuture;

use reqpipe_core::{
    Body, Headers, Method, PartData, RequestConfig, RequestError, Response, ResponseBody,
    ResponseKind, Transport,
};

const ERROR_BODY_PREVIEW: usize = 200;

/// A [`Transport`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a pre-configured client (custom TLS, proxies, pools).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, config: RequestConfig) -> BoxFuture<'static, Result<Response, RequestError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let signal = config.signal.clone();
            let send = send_inner(client, config);
            match signal {
                Some(signal) => {
                    tokio::select! {
                        result = send => result,
                        _ = signal.cancelled() => {
                            Err(RequestError::timeout("request aborted by signal"))
                        }
                    }
                }
                None => send.await,
            }
        })
    }
}

async fn send_inner(
    client: reqwest::Client,
    config: RequestConfig,
) -> Result<Response, RequestError> {
    let mut request = client.request(map_method(config.method), &config.url);

    if !config.params.is_empty() {
        let query: Vec<(String, String)> = config
            .params
            .iter()
            .map(|(name, value)| (name.clone(), param_text(value)))
            .collect();
        request = request.query(&query);
    }

    for (name, value) in config.headers.iter() {
        request = request.header(name, value);
    }

    if let Some(timeout) = config.effective_timeout() {
        request = request.timeout(timeout);
    }

    if config.method.allows_body() {
        if let Some(body) = config.data.clone() {
            request = match body {
                Body::Json(value) => request.json(&value),
                Body::Text(text) => request.body(text),
                Body::Bytes(bytes) => request.body(bytes),
                Body::Form(pairs) => request.form(&pairs),
                Body::Multipart(parts) => request.multipart(build_form(parts)?),
            };
        }
    } else if config.data.is_some() {
        tracing::warn!(
            method = %config.method,
            url = %config.url,
            "body dropped: method does not carry one"
        );
    }

    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status().as_u16();

    let mut headers = Headers::new();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str(), value);
        }
    }

    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("http error {status}")
        } else {
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            format!("http error {status}: {preview}")
        };
        return Err(RequestError::http(status, message));
    }

    let body = match config.response_kind {
        ResponseKind::Json => {
            let text = response.text().await.map_err(map_reqwest_error)?;
            if text.is_empty() {
                ResponseBody::Empty
            } else {
                match serde_json::from_str(&text) {
                    Ok(value) => ResponseBody::Json(value),
                    // Servers lie about content types; fall back to text.
                    Err(_) => ResponseBody::Text(text),
                }
            }
        }
        ResponseKind::Text => ResponseBody::Text(response.text().await.map_err(map_reqwest_error)?),
        ResponseKind::Bytes => {
            ResponseBody::Bytes(response.bytes().await.map_err(map_reqwest_error)?.to_vec())
        }
    };

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn map_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn param_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_form(parts: Vec<reqpipe_core::Part>) -> Result<reqwest::multipart::Form, RequestError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut piece = match part.data {
            PartData::Text(text) => reqwest::multipart::Part::text(text),
            PartData::Bytes(bytes) => reqwest::multipart::Part::bytes(bytes),
        };
        if let Some(filename) = part.filename {
            piece = piece.file_name(filename);
        }
        if let Some(content_type) = part.content_type {
            piece = piece.mime_str(&content_type).map_err(|e| {
                RequestError::validation(format!("invalid part content type: {e}"))
            })?;
        }
        form = form.part(part.name, piece);
    }
    Ok(form)
}

fn map_reqwest_error(error: reqwest::Error) -> RequestError {
    if error.is_timeout() {
        RequestError::timeout(format!("request timed out: {error}")).with_source(error)
    } else if error.is_connect() {
        RequestError::network(format!("connection failed: {error}")).with_source(error)
    } else if error.is_builder() {
        RequestError::validation(format!("malformed request: {error}")).with_source(error)
    } else {
        let message = format!("network error: {error}");
        RequestError::network(message).with_source(error)
    }
}
