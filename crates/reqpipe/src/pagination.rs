//! Pagination parameters and the page envelope.

use serde::de::DeserializeOwned;

use reqpipe_core::{ErrorKind, RequestError, Response, ResponseBody};

pub(crate) const DEFAULT_PAGE: u64 = 1;
pub(crate) const DEFAULT_LIMIT: u64 = 10;

/// Sort direction for paginated listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Query parameters for a paginated GET. Empty means "first page, default
/// limit".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub size: Option<u64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn sort(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(field.into());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }
}

/// One page of a listing, with derived navigation flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<U> {
    pub data: Vec<U>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Interprets a response as a page. Accepts either a bare JSON array or an
/// envelope object carrying `data` and optionally `total`.
pub(crate) fn parse_page<U: DeserializeOwned>(
    response: &Response,
    page: u64,
    limit: u64,
) -> Result<Page<U>, RequestError> {
    let value = match &response.body {
        ResponseBody::Json(value) => value.clone(),
        ResponseBody::Text(text) => serde_json::from_str(text).map_err(|e| {
            RequestError::new(ErrorKind::Unknown, format!("paginated body is not json: {e}"))
        })?,
        _ => {
            return Err(RequestError::new(
                ErrorKind::Unknown,
                "paginated response has no json body",
            ))
        }
    };

    let (items, total) = match value {
        serde_json::Value::Array(items) => {
            let total = items.len() as u64;
            (serde_json::Value::Array(items), total)
        }
        serde_json::Value::Object(mut envelope) => {
            let items = envelope
                .remove("data")
                .unwrap_or(serde_json::Value::Array(Vec::new()));
            let total = envelope
                .get("total")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or_else(|| items.as_array().map(Vec::len).unwrap_or(0) as u64);
            (items, total)
        }
        other => {
            return Err(RequestError::new(
                ErrorKind::Unknown,
                format!("paginated body has unexpected shape: {other}"),
            ))
        }
    };

    let data: Vec<U> = serde_json::from_value(items).map_err(|e| {
        RequestError::new(
            ErrorKind::Unknown,
            format!("failed to decode page items: {e}"),
        )
    })?;

    Ok(Page {
        data,
        total,
        page,
        limit,
        has_next: page.saturating_mul(limit) < total,
        has_prev: page > 1,
    })
}
