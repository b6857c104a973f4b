//! Inbound response normalization.
//!
//! # Responsibilities
//! - Turn a raw status/headers/body triple into a success or error envelope
//! - Derive pagination from headers (`X-Total-Count`, `Link`) or body fields
//!
//! # Design Decisions
//! - Unexpected statuses go through the same classification as the retry path
//! - Unknown total and no explicit flag means `has_more = false`

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::IntegrationError;

/// A response as received from a remote API.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string()).with_header("content-type", "application/json")
    }

    /// Add a header; invalid names or values are ignored.
    fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body as JSON; an empty body is `null`.
    pub fn body_json(&self) -> Result<Value, IntegrationError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub page_size: Option<u64>,
    pub total: Option<u64>,
    pub has_more: bool,
}

/// Normalized outcome of one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IntegrationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl ResponseEnvelope {
    pub fn into_result(self) -> Result<Value, IntegrationError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

pub fn process_response(raw: &RawResponse, expected_statuses: &[u16]) -> ResponseEnvelope {
    if !expected_statuses.contains(&raw.status) {
        let error = IntegrationError::from_status(raw.status, &raw.body_text(), &raw.headers);
        tracing::debug!(status = raw.status, code = %error.code, "Unexpected response status");
        return ResponseEnvelope {
            success: false,
            status_code: raw.status,
            data: None,
            error: Some(error),
            pagination: None,
        };
    }

    match raw.body_json() {
        Ok(data) => ResponseEnvelope {
            success: true,
            status_code: raw.status,
            pagination: extract_pagination_from(&raw.headers, &data),
            data: Some(data),
            error: None,
        },
        Err(error) => ResponseEnvelope {
            success: false,
            status_code: raw.status,
            data: None,
            error: Some(error.with_status(raw.status)),
            pagination: None,
        },
    }
}

/// Pagination of `raw`, or `None` when neither headers nor body carry any.
pub fn extract_pagination(raw: &RawResponse) -> Option<Pagination> {
    let body = raw.body_json().unwrap_or(Value::Null);
    extract_pagination_from(&raw.headers, &body)
}

fn extract_pagination_from(headers: &HeaderMap, body: &Value) -> Option<Pagination> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };
    let meta = body
        .get("pagination")
        .or_else(|| body.get("meta"))
        .unwrap_or(body);
    let field = |names: &[&str]| names.iter().find_map(|n| meta.get(*n).and_then(Value::as_u64));

    let next_link = headers
        .get_all("link")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(next_link_url);

    let page = header("x-page")
        .or_else(|| field(&["page", "current_page", "currentPage"]))
        .or_else(|| next_link.as_ref().and_then(|url| page_param(url)).map(|next| next.saturating_sub(1)));
    let page_size = header("x-per-page").or_else(|| field(&["page_size", "pageSize", "per_page", "perPage", "limit"]));
    let total = header("x-total-count").or_else(|| field(&["total", "total_count", "totalCount"]));
    let flag = ["has_more", "hasMore"]
        .iter()
        .find_map(|n| meta.get(*n).and_then(Value::as_bool));

    if page.is_none() && page_size.is_none() && total.is_none() && flag.is_none() && next_link.is_none() {
        return None;
    }

    let page = page.unwrap_or(1).max(1);
    let has_more = match (flag, &next_link, total, page_size) {
        (Some(flag), _, _, _) => flag,
        (None, Some(_), _, _) => true,
        (None, None, Some(total), Some(size)) => page.saturating_mul(size) < total,
        _ => false,
    };

    Some(Pagination {
        page,
        page_size,
        total,
        has_more,
    })
}

/// URL of the `rel="next"` entry in an RFC 8288 `Link` header.
fn next_link_url(header: &str) -> Option<Url> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if !is_next {
            return None;
        }
        Url::parse(target.trim_start_matches('<').trim_end_matches('>')).ok()
    })
}

fn page_param(url: &Url) -> Option<u64> {
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}
