//! Transport-neutral upstream abstractions.
//!
//! This crate intentionally does **not** depend on axum or any concrete HTTP client.
//! Callers describe upstream calls as `UpstreamHttpRequest` values and hand them to
//! an `UpstreamClient`; the binary injects the real client, tests inject fakes.

pub mod errors;
pub mod headers;
pub mod provider;
pub mod response;

pub use errors::UpstreamError;
pub use headers::{Headers, header_get, header_set};
pub use provider::{
    HttpMethod, UpstreamBody, UpstreamClient, UpstreamFuture, UpstreamHttpRequest,
    UpstreamHttpResponse,
};
pub use response::{CollectedResponse, ProxyResponse, StreamBody};
