use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use wreq::{Client, Method, Proxy};

use gemproxy_common::GlobalConfig;
use gemproxy_provider_core::{
    Headers, HttpMethod, UpstreamBody, UpstreamClient, UpstreamError, UpstreamFuture,
    UpstreamHttpRequest, UpstreamHttpResponse,
};

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            proxy: normalize_proxy(global.proxy.clone()),
            connect_timeout: Duration::from_secs(global.connect_timeout_secs),
            stream_idle_timeout: Duration::from_secs(global.stream_idle_timeout_secs),
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

/// `UpstreamClient` backed by one shared `wreq` connection pool.
///
/// No whole-request timeout is set on the pool: streaming replies are bounded
/// by the per-read idle timeout and the invoker bounds everything else.
#[derive(Clone)]
pub struct WreqUpstreamClient {
    config: UpstreamClientConfig,
    client: Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }
}

fn normalize_proxy(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

fn build_client(config: &UpstreamClientConfig) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.stream_idle_timeout);

    if let Some(proxy) = config.proxy.as_deref() {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(&'a self, req: UpstreamHttpRequest) -> UpstreamFuture<'a> {
        Box::pin(async move {
            let method = http_method_to_wreq(req.method);
            let mut builder = self.client.request(method, &req.url);

            for (k, v) in &req.headers {
                builder = builder.header(k, v);
            }

            if let Some(body) = req.body {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(map_wreq_error)?;
            convert_response(resp, req.is_stream, self.config.stream_idle_timeout).await
        })
    }
}

fn http_method_to_wreq(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
    }
}

async fn convert_response(
    resp: wreq::Response,
    want_stream: bool,
    stream_idle_timeout: Duration,
) -> Result<UpstreamHttpResponse, UpstreamError> {
    let status = resp.status().as_u16();
    let headers = headers_from_wreq(resp.headers());

    let is_success = (200..300).contains(&status);
    if !is_success || !want_stream {
        let body = resp.bytes().await.map_err(map_body_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = mpsc::channel::<Result<Bytes, UpstreamError>>(16);
    tokio::spawn(async move {
        let mut stream = resp.bytes_stream();
        loop {
            let item = match tokio::time::timeout(stream_idle_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => Ok(chunk),
                Ok(Some(Err(err))) => Err(map_body_error(err)),
                Ok(None) => break,
                Err(_) => Err(UpstreamError::Timeout(format!(
                    "no data from upstream for {}s",
                    stream_idle_timeout.as_secs()
                ))),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                debug!(event = "upstream_stream_cancelled");
                break;
            }
            if failed {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (k, v) in map {
        if let Ok(s) = v.to_str() {
            out.push((k.as_str().to_string(), s.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamError {
    let message = err.to_string();
    if err.is_timeout() {
        return UpstreamError::Timeout(message);
    }
    UpstreamError::ConnectionFailure(message)
}

/// The status line already arrived, so a failure here cut the body short.
fn map_body_error(err: wreq::Error) -> UpstreamError {
    if err.is_timeout() {
        return UpstreamError::Timeout(err.to_string());
    }
    UpstreamError::Interrupted(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_global_settings() {
        let global = GlobalConfig {
            proxy: Some("  ".to_string()),
            connect_timeout_secs: 3,
            stream_idle_timeout_secs: 9,
            ..GlobalConfig::default()
        };
        let config = UpstreamClientConfig::from_global(&global);
        assert_eq!(config.proxy, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.stream_idle_timeout, Duration::from_secs(9));
    }
}
