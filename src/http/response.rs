//! HTTP response building module
//!
//! Builders for plain status responses plus the JSON and HTML responders. The
//! `*_conditional` responders run the conditional GET check before producing a
//! body.

use super::body::{empty_body, full_body, ResponseBody};
use super::cache::{attach_modification_headers, conditional_get, RequestValidators};
use hyper::header::{ALLOW, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, PRAGMA};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::time::{Duration, SystemTime};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Build a `text/plain` response with the given status
pub fn build_text_response(status: StatusCode, text: impl Into<String>) -> Response<ResponseBody> {
    let text = text.into();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, text.len())
        .body(full_body(text))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(empty_body())
        })
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<ResponseBody> {
    build_text_response(StatusCode::NOT_FOUND, "404 Not Found")
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ResponseBody> {
    let mut response = build_text_response(StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed");
    response
        .headers_mut()
        .insert(ALLOW, hyper::header::HeaderValue::from_static("GET, HEAD, OPTIONS"));
    response
}

/// Build 500 Internal Server Error response carrying `message`
pub fn build_500_response(message: &str) -> Response<ResponseBody> {
    build_text_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Build OPTIONS response
pub fn build_options_response() -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ALLOW, "GET, HEAD, OPTIONS")
        .body(empty_body())
        .unwrap_or_else(|e| {
            log_build_error("OPTIONS", &e);
            Response::new(empty_body())
        })
}

/// Build health check response
pub fn build_health_response(status: &str) -> Response<ResponseBody> {
    build_text_response(StatusCode::OK, status.to_string())
}

// ----------------------------------------------------------------------------
// JSON
// ----------------------------------------------------------------------------

fn json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Response<ResponseBody>> {
    serde_json::to_vec(value).map_err(|e| {
        crate::logger::log_error(&format!("Failed to serialize response: {e}"));
        build_500_response(&format!("500 JSONResponse Failed:\n{e}"))
    })
}

fn json_body_response(
    builder: hyper::http::response::Builder,
    data: Vec<u8>,
    is_head: bool,
) -> Response<ResponseBody> {
    let content_length = data.len();
    let body = if is_head {
        empty_body()
    } else {
        full_body(data)
    };
    builder
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("JSON", &e);
            Response::new(empty_body())
        })
}

/// Serialize `value` as the JSON body of a `status` response
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match json_bytes(value) {
        Ok(data) => json_body_response(Response::builder().status(status), data, false),
        Err(response) => response,
    }
}

/// JSON response honouring conditional GET
///
/// Answers 304 when the client's validators match `etag`/`modified`, otherwise
/// 200 with the validators attached. The body is omitted for HEAD.
pub fn json_response_conditional<T: Serialize + ?Sized>(
    validators: &RequestValidators,
    is_head: bool,
    value: &T,
    etag: &str,
    modified: SystemTime,
    acceptable_age: Duration,
) -> Response<ResponseBody> {
    if let Some(not_modified) = conditional_get(validators, etag, modified, acceptable_age) {
        return not_modified;
    }
    match json_bytes(value) {
        Ok(data) => {
            let builder =
                attach_modification_headers(Response::builder().status(StatusCode::OK), etag, modified);
            json_body_response(builder, data, is_head)
        }
        Err(response) => response,
    }
}

macro_rules! json_status_shortcuts {
    ($($(#[$doc:meta])* $name:ident => $status:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name<T: Serialize + ?Sized>(value: &T) -> Response<ResponseBody> {
                json_response(StatusCode::$status, value)
            }
        )*
    };
}

json_status_shortcuts! {
    /// `json_response` with 200 OK
    json_ok => OK;
    /// `json_response` with 400 Bad Request
    json_bad_request => BAD_REQUEST;
    /// `json_response` with 401 Unauthorized
    json_unauthorized => UNAUTHORIZED;
    /// `json_response` with 403 Forbidden
    json_forbidden => FORBIDDEN;
    /// `json_response` with 404 Not Found
    json_not_found => NOT_FOUND;
    /// `json_response` with 405 Method Not Allowed
    json_method_not_allowed => METHOD_NOT_ALLOWED;
    /// `json_response` with 409 Conflict
    json_conflict => CONFLICT;
    /// `json_response` with 429 Too Many Requests
    json_too_many_requests => TOO_MANY_REQUESTS;
    /// `json_response` with 500 Internal Server Error
    json_internal_server_error => INTERNAL_SERVER_ERROR;
    /// `json_response` with 501 Not Implemented
    json_not_implemented => NOT_IMPLEMENTED;
    /// `json_response` with 503 Service Unavailable
    json_service_unavailable => SERVICE_UNAVAILABLE;
}

// ----------------------------------------------------------------------------
// HTML
// ----------------------------------------------------------------------------

/// Uncacheable UTF-8 HTML response with the given status
pub fn html_response_with_status(
    content: impl Into<String>,
    status: StatusCode,
) -> Response<ResponseBody> {
    let content = content.into();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HTML_CONTENT_TYPE)
        .header(CONTENT_LENGTH, content.len())
        .header(CACHE_CONTROL, "no-store")
        .header(PRAGMA, "no-cache")
        .body(full_body(content))
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(empty_body())
        })
}

/// UTF-8 HTML response honouring conditional GET
pub fn html_response_conditional(
    validators: &RequestValidators,
    is_head: bool,
    content: impl Into<String>,
    etag: &str,
    modified: SystemTime,
    acceptable_age: Duration,
) -> Response<ResponseBody> {
    if let Some(not_modified) = conditional_get(validators, etag, modified, acceptable_age) {
        return not_modified;
    }
    let content = content.into();
    let content_length = content.len();
    let body = if is_head {
        empty_body()
    } else {
        full_body(content)
    };
    attach_modification_headers(Response::builder().status(StatusCode::OK), etag, modified)
        .header(CONTENT_TYPE, HTML_CONTENT_TYPE)
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(empty_body())
        })
}

/// Log response build error
pub(crate) fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
