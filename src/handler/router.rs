//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, the health
//! and dump endpoints, then the archive content server.

use crate::config::AppState;
use crate::handler::dump;
use crate::http::{self, ResponseBody};
use crate::logger::{self, AccessLogEntry};
use hyper::header::{HeaderValue, CONTENT_LENGTH, SERVER};
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: Option<SocketAddr>,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let access_log = state.access_log_enabled();
    let mut entry = access_log.then(|| AccessLogEntry::from_request(&req, remote_addr));

    let mut response = route_request(&req, &state, remote_addr).await;

    if let Ok(value) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, value);
    }

    if let Some(entry) = entry.as_mut() {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Check HTTP method and return appropriate response for non-GET/HEAD methods
fn check_http_method(method: &Method) -> Option<Response<ResponseBody>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response()),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Route request based on path and configuration
async fn route_request<B>(
    req: &Request<B>,
    state: &AppState,
    remote_addr: Option<SocketAddr>,
) -> Response<ResponseBody> {
    if let Some(resp) = check_http_method(req.method()) {
        return resp;
    }

    let path = req.uri().path();

    // Health check first, it must stay cheap
    if path == state.config.http.health_path {
        return http::build_health_response("ok");
    }

    if state.config.http.dump_path.as_deref() == Some(path) {
        return dump::dump_request(req, remote_addr);
    }

    state.content.handle(req).await
}
