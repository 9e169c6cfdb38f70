use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::errors::UpstreamError;
use crate::headers::Headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    /// Ask the client to hand back the body incrementally on 2xx.
    pub is_stream: bool,
}

impl UpstreamHttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            is_stream: false,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body),
            is_stream: false,
        }
    }
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    /// Chunks in arrival order. A transport failure arrives as an `Err` item;
    /// a closed channel without one means the upstream finished cleanly.
    Stream(mpsc::Receiver<Result<Bytes, UpstreamError>>),
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

impl UpstreamHttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub type UpstreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UpstreamHttpResponse, UpstreamError>> + Send + 'a>>;

/// Performs one upstream HTTP exchange. Implementations never retry.
pub trait UpstreamClient: Send + Sync {
    fn send<'a>(&'a self, req: UpstreamHttpRequest) -> UpstreamFuture<'a>;
}
