//! HTTP cache validation module
//!
//! Conditional GET handling shared by the archive server and the JSON/HTML
//! responders: `ETag`/`If-None-Match` and `Last-Modified`/`If-Modified-Since`.

use super::body::{empty_body, ResponseBody};
use super::response::log_build_error;
use hyper::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use hyper::http::response::Builder;
use hyper::{HeaderMap, Response, StatusCode};
use std::time::{Duration, SystemTime};

/// Validators sent by the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestValidators {
    /// Raw `If-None-Match` header
    pub if_none_match: Option<String>,
    /// Raw `If-Modified-Since` header
    pub if_modified_since: Option<String>,
}

impl RequestValidators {
    /// Extract the conditional headers from a request's header map
    ///
    /// Non-ASCII header values are treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_none_match: header_string(headers, &IF_NONE_MATCH),
            if_modified_since: header_string(headers, &IF_MODIFIED_SINCE),
        }
    }
}

fn header_string(headers: &HeaderMap, name: &hyper::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Outcome of evaluating the client's validators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The client copy is current; answer 304
    Matched,
    /// Send the full representation
    NotMatched,
}

/// Decide whether the client's cached copy is still valid
///
/// `If-None-Match` is checked first. Failing that, `If-Modified-Since` matches
/// when `modified` is strictly earlier than the client's date plus
/// `acceptable_age`. An unparsable date counts as absent.
pub fn evaluate(
    validators: &RequestValidators,
    etag: &str,
    modified: SystemTime,
    acceptable_age: Duration,
) -> Validation {
    if check_etag_match(validators.if_none_match.as_deref(), etag) {
        return Validation::Matched;
    }
    let since = validators
        .if_modified_since
        .as_deref()
        .and_then(|text| httpdate::parse_http_date(text).ok());
    if let Some(since) = since {
        if since
            .checked_add(acceptable_age)
            .is_some_and(|limit| modified < limit)
        {
            return Validation::Matched;
        }
    }
    Validation::NotMatched
}

/// Perform a conditional GET
///
/// Returns the complete 304 response when the client copy is current. Returns
/// `None` otherwise; the caller then sends the content and must attach the same
/// validators with [`attach_modification_headers`].
pub fn conditional_get(
    validators: &RequestValidators,
    etag: &str,
    modified: SystemTime,
    acceptable_age: Duration,
) -> Option<Response<ResponseBody>> {
    match evaluate(validators, etag, modified, acceptable_age) {
        Validation::Matched => Some(build_not_modified_response(etag, modified)),
        Validation::NotMatched => None,
    }
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Supports:
/// - Single `ETag`: `"abc123"`
/// - Multiple `ETags`: `"abc123", "def456"`
/// - Wildcard: `*`
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag
            .split(',')
            .any(|e| e.trim() == etag || e.trim() == "*")
    })
}

/// Format `time` as an IMF-fixdate, e.g. `Wed, 01 Jan 2020 00:00:00 GMT`
pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Add `ETag` and `Last-Modified` to a response under construction
pub fn attach_modification_headers(builder: Builder, etag: &str, modified: SystemTime) -> Builder {
    builder
        .header(ETAG, etag)
        .header(LAST_MODIFIED, format_http_date(modified))
}

/// Build 304 Not Modified response
///
/// Never carries a body, whatever the request method.
pub fn build_not_modified_response(etag: &str, modified: SystemTime) -> Response<ResponseBody> {
    attach_modification_headers(
        Response::builder().status(StatusCode::NOT_MODIFIED),
        etag,
        modified,
    )
    .body(empty_body())
    .unwrap_or_else(|e| {
        log_build_error("304", &e);
        let mut response = Response::new(empty_body());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        response
    })
}
