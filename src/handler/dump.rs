//! Request dump handler
//!
//! Echoes what the server received as pretty JSON. Meant for debugging proxies
//! and clients; mounted only when `http.dump_path` is configured.

use crate::http::body::{empty_body, full_body};
use crate::http::ResponseBody;
use crate::http::response::JSON_CONTENT_TYPE;
use crate::logger;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;

#[derive(Debug, Serialize)]
pub struct UriDump {
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: String,
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestDump {
    pub method: String,
    pub uri: UriDump,
    pub request_uri: String,
    pub version: String,
    /// Header name to every value received for it, in arrival order
    pub headers: BTreeMap<String, Vec<String>>,
    pub content_length: Option<u64>,
    pub host: Option<String>,
    pub remote_addr: Option<String>,
}

impl RequestDump {
    pub fn from_request<B>(req: &Request<B>, remote_addr: Option<SocketAddr>) -> Self {
        let uri = req.uri();
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in req.headers() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let content_length = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let host = uri.authority().map(ToString::to_string).or_else(|| {
            req.headers()
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        });

        Self {
            method: req.method().to_string(),
            uri: UriDump {
                scheme: uri.scheme_str().map(ToString::to_string),
                authority: uri.authority().map(ToString::to_string),
                path: uri.path().to_string(),
                query: uri.query().map(ToString::to_string),
            },
            request_uri: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string),
            version: format!("{:?}", req.version()),
            headers,
            content_length,
            host,
            remote_addr: remote_addr.map(|a| a.to_string()),
        }
    }
}

/// Respond with a JSON description of `req`
pub fn dump_request<B>(req: &Request<B>, remote_addr: Option<SocketAddr>) -> Response<ResponseBody> {
    let dump = RequestDump::from_request(req, remote_addr);
    let json = match serde_json::to_string_pretty(&dump) {
        Ok(j) => j,
        Err(e) => {
            logger::log_error(&format!("Failed to serialize request dump: {e}"));
            return crate::http::build_500_response(&format!("500 DumpRequest Failed:\n{e}"));
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(CONTENT_LENGTH, json.len())
        .body(full_body(json))
        .unwrap_or_else(|e| {
            crate::http::response::log_build_error("dump", &e);
            Response::new(empty_body())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_dump_fields() {
        let req = Request::builder()
            .method("GET")
            .uri("/debug/dump?x=1&y=2")
            .header("host", "example.com:8080")
            .header("accept", "text/html")
            .header("accept", "application/json")
            .body(())
            .unwrap();
        let addr: SocketAddr = "10.0.0.7:41000".parse().unwrap();
        let dump = RequestDump::from_request(&req, Some(addr));

        assert_eq!(dump.method, "GET");
        assert_eq!(dump.uri.path, "/debug/dump");
        assert_eq!(dump.uri.query.as_deref(), Some("x=1&y=2"));
        assert_eq!(dump.request_uri, "/debug/dump?x=1&y=2");
        assert_eq!(dump.host.as_deref(), Some("example.com:8080"));
        assert_eq!(dump.remote_addr.as_deref(), Some("10.0.0.7:41000"));
        assert_eq!(
            dump.headers["accept"],
            vec!["text/html".to_string(), "application/json".to_string()]
        );
        assert_eq!(dump.content_length, None);
    }

    #[tokio::test]
    async fn test_dump_response_is_json() {
        let req = Request::builder().uri("/dump").body(()).unwrap();
        let response = dump_request(&req, None);
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["uri"]["path"], "/dump");
        assert!(value["remote_addr"].is_null());
    }
}
