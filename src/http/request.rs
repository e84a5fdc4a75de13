//! JSON request body decoding

use super::body::ResponseBody;
use super::response::build_text_response;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty request body")]
    EmptyBody,

    #[error("failed to read request body: {0}")]
    Read(String),

    #[error("malformed JSON request: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl DecodeError {
    /// The 400 response reported to the client for this error
    pub fn into_response(self) -> Response<ResponseBody> {
        match self {
            Self::EmptyBody => build_text_response(StatusCode::BAD_REQUEST, "empty request"),
            Self::Read(_) | Self::Malformed(_) => {
                build_text_response(StatusCode::BAD_REQUEST, "malformed request")
            }
        }
    }
}

/// Collect `body` and decode it as JSON
pub async fn decode_json_request<T, B>(body: B) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: std::fmt::Display,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| DecodeError::Read(e.to_string()))?
        .to_bytes();
    if bytes.is_empty() {
        return Err(DecodeError::EmptyBody);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Login {
        user: String,
    }

    #[tokio::test]
    async fn test_decode_valid() {
        let body = Full::new(Bytes::from(r#"{"user":"ann"}"#));
        let login: Login = decode_json_request(body).await.unwrap();
        assert_eq!(login.user, "ann");
    }

    #[tokio::test]
    async fn test_decode_empty() {
        let body = Full::new(Bytes::new());
        let err = decode_json_request::<Login, _>(body).await.unwrap_err();
        assert!(matches!(err, DecodeError::EmptyBody));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_decode_malformed() {
        let body = Full::new(Bytes::from("{user:"));
        let err = decode_json_request::<Login, _>(body).await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
