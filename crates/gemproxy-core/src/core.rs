use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use gemproxy_common::GlobalConfig;
use gemproxy_provider_core::{ProxyResponse, UpstreamClient};
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};

use crate::error::ProxyError;
use crate::event::{InboundRequest, ServerlessEvent, ServerlessResponse};
use crate::handler;
use crate::invoker::GeminiInvoker;

pub struct CoreState {
    pub config: GlobalConfig,
    pub invoker: GeminiInvoker,
}

/// The proxy, wired to one upstream client.
#[derive(Clone)]
pub struct Core {
    state: Arc<CoreState>,
}

impl Core {
    pub fn new(config: GlobalConfig, client: Arc<dyn UpstreamClient>) -> Self {
        let invoker = GeminiInvoker::from_config(client, &config);
        Self {
            state: Arc::new(CoreState { config, invoker }),
        }
    }

    /// Every path goes through the same handler; routing happens in
    /// [`crate::classify`].
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<CoreState> {
        self.state.clone()
    }

    pub async fn handle(&self, req: InboundRequest) -> ProxyResponse {
        handler::handle(&self.state, req).await
    }

    /// Serve one function-compute HTTP event given as raw JSON.
    pub async fn handle_event(&self, raw: &[u8]) -> ServerlessResponse {
        let response = match ServerlessEvent::from_slice(raw).and_then(ServerlessEvent::into_request)
        {
            Ok(req) => self.handle(req).await,
            Err(err) => handler::reject(ProxyError::validation("invalid_event", err.to_string())),
        };
        ServerlessResponse::from_proxy_response(response).await
    }
}

async fn proxy_handler(State(state): State<Arc<CoreState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            let err = ProxyError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "invalid_request_error",
                "invalid_body",
                format!("request body rejected: {err}"),
            );
            return into_axum_response(handler::reject(err));
        }
    };
    let req = InboundRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers: parts.headers,
        body,
    };
    into_axum_response(handler::handle(&state, req).await)
}

pub fn into_axum_response(response: ProxyResponse) -> Response {
    match response {
        ProxyResponse::Full {
            status,
            headers,
            body,
        } => {
            let mut resp = Response::new(Body::from(body));
            *resp.status_mut() = status;
            resp.headers_mut().extend(headers);
            resp
        }
        ProxyResponse::Stream {
            status,
            headers,
            body,
        } => {
            let mut resp = Response::new(Body::from_stream(body.stream));
            *resp.status_mut() = status;
            resp.headers_mut().extend(headers);
            if !resp.headers().contains_key(CONTENT_TYPE) {
                resp.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(body.content_type));
            }
            resp
        }
    }
}
