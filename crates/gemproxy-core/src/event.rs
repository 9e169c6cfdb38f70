use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use gemproxy_provider_core::ProxyResponse;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The one request shape routing and handlers work with, whichever host
/// delivered it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported HTTP method: {0}")]
    InvalidMethod(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpContext {
    method: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestContext {
    http: Option<HttpContext>,
}

/// HTTP-trigger event as delivered by function-compute style platforms.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerlessEvent {
    request_context: Option<RequestContext>,
    http_method: Option<String>,
    raw_path: Option<String>,
    path: Option<String>,
    headers: BTreeMap<String, JsonValue>,
    body: Option<String>,
    is_base64_encoded: bool,
}

impl ServerlessEvent {
    pub fn from_slice(raw: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(raw)?)
    }

    fn http_context(&self) -> Option<&HttpContext> {
        self.request_context.as_ref()?.http.as_ref()
    }

    /// Normalize into an [`InboundRequest`]. Missing method means `GET`,
    /// missing path means `/`.
    pub fn into_request(self) -> Result<InboundRequest, EventError> {
        let method = self
            .http_context()
            .and_then(|http| http.method.clone())
            .or_else(|| self.http_method.clone())
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| "GET".to_string());
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| EventError::InvalidMethod(method))?;

        let path = self
            .raw_path
            .clone()
            .or_else(|| self.path.clone())
            .or_else(|| self.http_context().and_then(|http| http.path.clone()))
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| "/".to_string());

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let value = match value {
                JsonValue::String(value) => value.clone(),
                JsonValue::Array(values) => values
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
                JsonValue::Null => continue,
                other => other.to_string(),
            };
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) else {
                continue;
            };
            headers.append(name, value);
        }

        let body = match self.body {
            Some(body) if self.is_base64_encoded && !body.is_empty() => {
                Bytes::from(STANDARD.decode(body.as_bytes())?)
            }
            Some(body) => Bytes::from(body),
            None => Bytes::new(),
        };

        Ok(InboundRequest {
            method,
            path,
            headers,
            body,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ServerlessResponse {
    /// Drain `response` into the platform reply. A streamed body is collected;
    /// if it fails part-way the bytes received so far are returned.
    pub async fn from_proxy_response(response: ProxyResponse) -> Self {
        let collected = response.collect().await;
        let mut headers = BTreeMap::new();
        for (name, value) in &collected.headers {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        Self {
            status_code: collected.status.as_u16(),
            headers,
            body: String::from_utf8_lossy(&collected.body).into_owned(),
            is_base64_encoded: false,
        }
    }
}
