use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, HeaderValue, StatusCode, header};

/// What every handler produces, independent of the hosting HTTP framework.
#[derive(Debug)]
pub enum ProxyResponse {
    Full {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Stream {
        status: StatusCode,
        headers: HeaderMap,
        body: StreamBody,
    },
}

pub struct StreamBody {
    pub content_type: &'static str,
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>,
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBody")
            .field("content_type", &self.content_type)
            .field("stream", &"<opaque>")
            .finish()
    }
}

impl StreamBody {
    pub fn new<S>(content_type: &'static str, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        Self {
            content_type,
            stream: Box::pin(stream),
        }
    }
}

/// A response whose body has been drained into memory.
#[derive(Debug, Clone)]
pub struct CollectedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// False when a stream body failed before its natural end.
    pub complete: bool,
}

impl ProxyResponse {
    pub fn json(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        ProxyResponse::Full {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        ProxyResponse::Full {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn stream(status: StatusCode, body: StreamBody) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(body.content_type),
        );
        ProxyResponse::Stream {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyResponse::Full { status, .. } | ProxyResponse::Stream { status, .. } => *status,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            ProxyResponse::Full { headers, .. } | ProxyResponse::Stream { headers, .. } => headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            ProxyResponse::Full { headers, .. } | ProxyResponse::Stream { headers, .. } => headers,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, ProxyResponse::Stream { .. })
    }

    /// Drain the body. A stream error ends collection and keeps what arrived.
    pub async fn collect(self) -> CollectedResponse {
        match self {
            ProxyResponse::Full {
                status,
                headers,
                body,
            } => CollectedResponse {
                status,
                headers,
                body,
                complete: true,
            },
            ProxyResponse::Stream {
                status,
                headers,
                mut body,
            } => {
                let mut buf = BytesMut::new();
                let mut complete = true;
                while let Some(item) = body.stream.next().await {
                    match item {
                        Ok(chunk) => buf.extend_from_slice(&chunk),
                        Err(_) => {
                            complete = false;
                            break;
                        }
                    }
                }
                CollectedResponse {
                    status,
                    headers,
                    body: buf.freeze(),
                    complete,
                }
            }
        }
    }
}
