use std::time::Instant;

use bytes::Bytes;
use gemproxy_protocol::openai::create_chat_completions::request::{
    CreateChatCompletionRequestBody, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use gemproxy_protocol::openai::create_chat_completions::types::ChatMessage;
use gemproxy_protocol::openai::create_image::request::{CreateImageRequestBody, DEFAULT_IMAGE_SIZE};
use gemproxy_protocol::sse;
use gemproxy_provider_core::{ProxyResponse, StreamBody, UpstreamError};
use gemproxy_transform::create_image::openai2gemini::{
    request as image_request, response as image_response,
};
use gemproxy_transform::normalize::normalize_messages;
use gemproxy_transform::stream::translate;
use http::header::{CACHE_CONTROL, HeaderValue};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::extract_credential;
use crate::classify::{Route, classify_request};
use crate::core::CoreState;
use crate::error::ProxyError;
use crate::event::InboundRequest;
use crate::invoker::{ChatInvocation, ChatReply, InvokeMode};
use crate::registry;

pub const REQUEST_ID_HEADER: &str = "x-gemproxy-request-id";
pub const SERVICE_NAME: &str = "gemproxy";

const CHAT_ERROR_CODE: &str = "gemini_proxy_error";
const IMAGE_ERROR_CODE: &str = "image_generation_error";

const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET, POST, OPTIONS"),
    ("access-control-allow-headers", "Content-Type, Authorization"),
];

/// Serve one request end to end. Never fails: every error becomes a JSON
/// error response carrying the CORS headers.
pub async fn handle(state: &CoreState, req: InboundRequest) -> ProxyResponse {
    let trace_id = Uuid::new_v4().to_string();
    let started_at = Instant::now();
    let route = classify_request(&req);
    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        method = %req.method,
        path = %req.path,
        route = route.as_str()
    );

    let result = match route {
        Route::Health => health(),
        Route::ListModels => list_models(),
        Route::ChatCompletions => chat_completions(state, &req, &trace_id).await,
        Route::ImageGeneration => image_generations(state, &req, &trace_id).await,
        Route::CorsPreflight => Ok(ProxyResponse::empty(StatusCode::OK)),
        Route::NotFound => Err(ProxyError::not_found(&req.path)),
    };
    let response = result.unwrap_or_else(|err| {
        warn!(
            event = "request_failed",
            trace_id = %trace_id,
            status = err.status.as_u16(),
            kind = err.kind,
            code = %err.code,
            message = %err.message
        );
        err.into_response()
    });
    let response = finish(response, &trace_id);

    info!(
        event = "downstream_responded",
        trace_id = %trace_id,
        route = route.as_str(),
        status = response.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        is_stream = response.is_stream()
    );
    response
}

/// Error response for a request that never reached routing.
pub fn reject(err: ProxyError) -> ProxyResponse {
    let trace_id = Uuid::new_v4().to_string();
    warn!(
        event = "request_rejected",
        trace_id = %trace_id,
        status = err.status.as_u16(),
        message = %err.message
    );
    finish(err.into_response(), &trace_id)
}

fn finish(mut response: ProxyResponse, trace_id: &str) -> ProxyResponse {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<ProxyResponse, ProxyError> {
    let body = serde_json::to_vec(body).map_err(|err| {
        ProxyError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "server_error",
            err.to_string(),
        )
    })?;
    Ok(ProxyResponse::json(status, body))
}

fn upstream_error(err: &UpstreamError, code: &'static str, trace_id: &str) -> ProxyError {
    let err = ProxyError::from_upstream(err, code);
    if err.status.is_server_error() {
        err.with_request_id(trace_id)
    } else {
        err
    }
}

fn health() -> Result<ProxyResponse, ProxyError> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "timestamp": timestamp,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "models": registry::model_count(),
            "features": {
                "streaming": true,
                "cors": true,
                "flexible_auth": true,
                "function_calling": true,
                "image_generation": true,
                "vision": true
            }
        }),
    )
}

fn list_models() -> Result<ProxyResponse, ProxyError> {
    let created = OffsetDateTime::now_utc().unix_timestamp();
    json_response(StatusCode::OK, &registry::list_models(created))
}

/// A chat request that passed validation.
#[derive(Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: i64,
    stream: bool,
    tools: Option<Vec<JsonValue>>,
}

fn parse_chat_request(raw: &Bytes) -> Result<ChatRequest, ProxyError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ProxyError::validation("invalid_body", "request body is empty"));
    }
    let value: JsonValue = serde_json::from_slice(raw).map_err(|err| {
        ProxyError::validation("invalid_body", format!("request body is not valid JSON: {err}"))
    })?;
    let Some(object) = value.as_object() else {
        return Err(ProxyError::validation(
            "invalid_body",
            "request body must be a JSON object",
        ));
    };

    let model = match object.get("model") {
        Some(JsonValue::String(model)) if !model.is_empty() => model.clone(),
        _ => {
            return Err(ProxyError::validation(
                "missing_model",
                "`model` is required",
            ));
        }
    };
    if !registry::is_chat_model(&model) {
        return Err(ProxyError::validation(
            "model_not_supported",
            format!(
                "model {model} is not supported; supported models: {}",
                registry::CHAT_MODELS.join(", ")
            ),
        ));
    }
    let messages = match object.get("messages") {
        Some(items @ JsonValue::Array(list)) if !list.is_empty() => {
            Vec::<ChatMessage>::deserialize(items).map_err(|err| {
                ProxyError::validation("invalid_messages", format!("invalid `messages`: {err}"))
            })?
        }
        _ => {
            return Err(ProxyError::validation(
                "invalid_messages",
                "`messages` must be a non-empty array",
            ));
        }
    };

    let body: CreateChatCompletionRequestBody = serde_json::from_value(value).map_err(|err| {
        ProxyError::validation("invalid_body", format!("invalid request: {err}"))
    })?;
    Ok(ChatRequest {
        model,
        messages,
        temperature: body.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: body.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stream: body.stream.unwrap_or(false),
        tools: body.tools,
    })
}

async fn chat_completions(
    state: &CoreState,
    req: &InboundRequest,
    trace_id: &str,
) -> Result<ProxyResponse, ProxyError> {
    let chat = parse_chat_request(&req.body)?;
    let credential = extract_credential(&req.headers, state.config.default_api_key.as_deref())
        .ok_or_else(|| upstream_error(&UpstreamError::NoCredential, CHAT_ERROR_CODE, trace_id))?;

    let messages = normalize_messages(chat.messages, &state.invoker).await;
    let mode = InvokeMode::for_messages(&messages);
    info!(
        event = "chat_dispatch",
        trace_id = %trace_id,
        model = %chat.model,
        mode = mode.as_str(),
        messages = messages.len(),
        stream = chat.stream,
        tools = chat.tools.as_ref().map_or(0, Vec::len)
    );

    let invocation = ChatInvocation {
        model: chat.model,
        messages,
        temperature: chat.temperature,
        max_tokens: chat.max_tokens,
        stream: chat.stream,
        tools: chat.tools,
    };
    match state.invoker.chat(Some(&credential), invocation).await {
        Ok(ChatReply::Complete(completion)) => json_response(StatusCode::OK, &completion),
        Ok(ChatReply::Stream(chunks)) => {
            let body = StreamBody::new(sse::CONTENT_TYPE, translate(chunks));
            let mut response = ProxyResponse::stream(StatusCode::OK, body);
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            Ok(response)
        }
        Err(err) => Err(upstream_error(&err, CHAT_ERROR_CODE, trace_id)),
    }
}

async fn image_generations(
    state: &CoreState,
    req: &InboundRequest,
    trace_id: &str,
) -> Result<ProxyResponse, ProxyError> {
    let body: CreateImageRequestBody = serde_json::from_slice(&req.body).map_err(|err| {
        ProxyError::validation("invalid_body", format!("request body is not valid JSON: {err}"))
    })?;

    let model = body
        .model
        .unwrap_or_else(|| registry::DEFAULT_IMAGE_MODEL.to_string());
    if !registry::is_image_model(&model) {
        return Err(ProxyError::validation(
            "model_not_supported",
            format!(
                "image model {model} is not supported; supported models: {}",
                registry::IMAGE_MODELS.join(", ")
            ),
        ));
    }
    let Some(prompt) = body.prompt.filter(|prompt| !prompt.trim().is_empty()) else {
        return Err(ProxyError::validation(
            "invalid_prompt",
            "`prompt` must be a non-empty string",
        ));
    };
    let size = body.size.unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());
    let n = body.n.unwrap_or(1);

    let credential = extract_credential(&req.headers, state.config.default_api_key.as_deref())
        .ok_or_else(|| upstream_error(&UpstreamError::NoCredential, IMAGE_ERROR_CODE, trace_id))?;

    info!(
        event = "image_dispatch",
        trace_id = %trace_id,
        model = %model,
        size = %size,
        n
    );
    let request = image_request::transform_request(&model, &prompt, &size, n);
    let generated = state
        .invoker
        .generate_image(Some(&credential), request)
        .await
        .map_err(|err| upstream_error(&err, IMAGE_ERROR_CODE, trace_id))?;

    let response = image_response::transform_response(&prompt, generated, OffsetDateTime::now_utc());
    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<ChatRequest, ProxyError> {
        parse_chat_request(&Bytes::copy_from_slice(raw.as_bytes()))
    }

    #[test]
    fn chat_validation_codes() {
        assert_eq!(parse("").unwrap_err().code, "invalid_body");
        assert_eq!(parse("[1]").unwrap_err().code, "invalid_body");
        assert_eq!(parse("{").unwrap_err().code, "invalid_body");
        assert_eq!(parse(r#"{"messages":[]}"#).unwrap_err().code, "missing_model");
        assert_eq!(
            parse(r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#)
                .unwrap_err()
                .code,
            "model_not_supported"
        );
        assert_eq!(
            parse(r#"{"model":"gemini-2.0-flash","messages":[]}"#)
                .unwrap_err()
                .code,
            "invalid_messages"
        );
        assert_eq!(
            parse(r#"{"model":"gemini-2.0-flash","messages":"hi"}"#)
                .unwrap_err()
                .code,
            "invalid_messages"
        );
        assert_eq!(
            parse(r#"{"model":"gemini-2.0-flash","messages":[{"role":"robot","content":"x"}]}"#)
                .unwrap_err()
                .code,
            "invalid_messages"
        );
    }

    #[test]
    fn bad_scalar_fields_are_invalid_body() {
        for raw in [
            r#"{"model":"gemini-2.0-flash","messages":[{"role":"user","content":"hi"}],"max_tokens":100.5}"#,
            r#"{"model":"gemini-2.0-flash","messages":[{"role":"user","content":"hi"}],"temperature":"hot"}"#,
            r#"{"model":"gemini-2.0-flash","messages":[{"role":"user","content":"hi"}],"stream":"yes"}"#,
        ] {
            assert_eq!(parse(raw).unwrap_err().code, "invalid_body", "{raw}");
        }
    }

    #[test]
    fn chat_defaults_apply() {
        let chat = parse(r#"{"model":"gemini-2.0-flash","messages":[{"role":"user","content":"hi"}]}"#)
            .unwrap();
        assert_eq!(chat.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(chat.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!chat.stream);
        assert!(chat.tools.is_none());
        assert_eq!(chat.messages.len(), 1);
    }

    #[test]
    fn validation_errors_are_invalid_request() {
        let err = parse(r#"{"model":"nope","messages":[]}"#).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.kind, "invalid_request_error");
    }
}
