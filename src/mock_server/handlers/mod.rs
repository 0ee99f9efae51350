//! HTTP request handlers for the mock server.
//!
//! Handlers take their parameters as raw pairs since the platform repeats
//! keys such as `values` in form bodies.

pub mod portfolios;
pub mod projects;
pub mod system;

pub use portfolios::*;
pub use projects::*;
pub use system::*;

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::state::MockState;

pub type SharedState = Arc<RwLock<MockState>>;

/// Query string or form parameters, in request order.
pub type Params = Vec<(String, String)>;

/// First value of `key`.
pub fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Every value of a repeated `key`.
pub fn param_all<'a>(params: &'a Params, key: &str) -> Vec<&'a str> {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

/// Page number and size from `p` and `ps`.
pub fn paging(params: &Params) -> (usize, usize) {
    let page = param(params, "p").and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
    let size = param(params, "ps").and_then(|p| p.parse().ok()).unwrap_or(100).max(1);
    (page, size)
}

/// One page of `items` with the platform `paging` block.
pub fn paged<T: Clone>(items: &[T], params: &Params) -> (Vec<T>, Value) {
    let (page, size) = paging(params);
    let slice = items.iter().skip((page - 1) * size).take(size).cloned().collect();
    (slice, json!({"pageIndex": page, "pageSize": size, "total": items.len()}))
}

/// Error body the way the platform formats it.
pub fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({"errors": [{"msg": msg.into()}]}))).into_response()
}

pub fn not_found(msg: impl Into<String>) -> Response {
    error(StatusCode::NOT_FOUND, msg)
}

pub fn bad_request(msg: impl Into<String>) -> Response {
    error(StatusCode::BAD_REQUEST, msg)
}

/// Missing mandatory parameter.
pub fn missing(key: &str) -> Response {
    bad_request(format!("The '{key}' parameter is missing"))
}

pub fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
