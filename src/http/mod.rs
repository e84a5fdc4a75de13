//! HTTP protocol layer module
//!
//! Response bodies, cache validation, MIME detection and response builders,
//! kept independent of the archive so other handlers can share them.

pub mod body;
pub mod cache;
pub mod mime;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use body::{channel_body, empty_body, full_body, ResponseBody};
pub use cache::{conditional_get, RequestValidators, Validation};
pub use request::{decode_json_request, DecodeError};
pub use response::{
    build_404_response, build_405_response, build_500_response, build_health_response,
    build_options_response, html_response_conditional, html_response_with_status,
    json_response, json_response_conditional,
};
