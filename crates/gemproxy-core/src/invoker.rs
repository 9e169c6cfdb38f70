use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use gemproxy_common::GlobalConfig;
use gemproxy_protocol::gemini::generate_image::request::GenerateImageRequest;
use gemproxy_protocol::gemini::generate_image::response::GenerateImageResponse;
use gemproxy_protocol::openai::create_chat_completions::request::UpstreamChatCompletionRequestBody;
use gemproxy_protocol::sse;
use gemproxy_provider_core::{
    UpstreamBody, UpstreamClient, UpstreamError, UpstreamHttpRequest, UpstreamHttpResponse,
    header_get, header_set,
};
use gemproxy_transform::create_image::openai2gemini::response::parse_response as parse_image_response;
use gemproxy_transform::generate_content::openai_chat_completions2gemini::{
    request as chat_request, response as chat_response,
};
use gemproxy_transform::normalize::{
    FetchedImage, ImageFetchError, ImageFetcher, NormalizedMessage, has_inline_image,
    to_openai_messages,
};
use gemproxy_transform::stream::{ChunkStream, chunks_from_vec, decode_sse_chunks};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const COMPAT_CHAT_PATH: &str = "/v1beta/openai/chat/completions";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Which Gemini endpoint serves a chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeMode {
    /// OpenAI-compatible endpoint; supports streaming and tools.
    Plain,
    /// Native `generateContent`; needed for inline images.
    Native,
}

impl InvokeMode {
    pub fn for_messages(messages: &[NormalizedMessage]) -> Self {
        if has_inline_image(messages) {
            InvokeMode::Native
        } else {
            InvokeMode::Plain
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvokeMode::Plain => "plain",
            InvokeMode::Native => "native",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatInvocation {
    pub model: String,
    pub messages: Vec<NormalizedMessage>,
    pub temperature: f64,
    pub max_tokens: i64,
    pub stream: bool,
    pub tools: Option<Vec<JsonValue>>,
}

pub enum ChatReply {
    /// A complete `chat.completion` object.
    Complete(JsonValue),
    /// Upstream chunks, ready for the stream translator.
    Stream(ChunkStream),
}

/// Issues every call to the Gemini API. Single attempt, no retries.
#[derive(Clone)]
pub struct GeminiInvoker {
    client: Arc<dyn UpstreamClient>,
    base_url: String,
    request_timeout: Duration,
}

impl GeminiInvoker {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(client: Arc<dyn UpstreamClient>, config: &GlobalConfig) -> Self {
        Self::new(
            client,
            config.upstream_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn chat(
        &self,
        credential: Option<&str>,
        invocation: ChatInvocation,
    ) -> Result<ChatReply, UpstreamError> {
        let credential = credential.ok_or(UpstreamError::NoCredential)?;
        match InvokeMode::for_messages(&invocation.messages) {
            InvokeMode::Plain => self.chat_plain(credential, invocation).await,
            InvokeMode::Native => self.chat_native(credential, invocation).await,
        }
    }

    async fn chat_plain(
        &self,
        credential: &str,
        invocation: ChatInvocation,
    ) -> Result<ChatReply, UpstreamError> {
        let want_stream = invocation.stream;
        let body = UpstreamChatCompletionRequestBody {
            model: invocation.model,
            messages: to_openai_messages(invocation.messages),
            temperature: invocation.temperature,
            max_tokens: invocation.max_tokens,
            stream: want_stream,
            tools: invocation.tools.filter(|tools| !tools.is_empty()),
        };
        let mut req = UpstreamHttpRequest::post_json(self.url(COMPAT_CHAT_PATH), encode(&body)?);
        header_set(&mut req.headers, "Authorization", format!("Bearer {credential}"));
        if want_stream {
            header_set(&mut req.headers, "Accept", sse::CONTENT_TYPE);
            req.is_stream = true;
        }

        let resp = self.send(req).await?;
        if !want_stream {
            let body = read_body(resp.body).await?;
            return chat_response::parse_compat_response(&body).map(ChatReply::Complete);
        }
        let chunks = match resp.body {
            UpstreamBody::Stream(rx) => decode_sse_chunks(ReceiverStream::new(rx)),
            UpstreamBody::Bytes(bytes) => decode_sse_chunks(stream::iter(vec![Ok(bytes)])),
        };
        Ok(ChatReply::Stream(chunks))
    }

    async fn chat_native(
        &self,
        credential: &str,
        invocation: ChatInvocation,
    ) -> Result<ChatReply, UpstreamError> {
        if invocation.tools.is_some() {
            debug!(event = "tools_ignored", model = %invocation.model);
        }
        let model = invocation.model.clone();
        let native = chat_request::transform_request(
            &invocation.model,
            invocation.messages,
            invocation.temperature,
            invocation.max_tokens,
        );
        let url = self.url(&format!("/v1beta/models/{}:generateContent", native.model));
        let mut req = UpstreamHttpRequest::post_json(url, encode(&native.body)?);
        header_set(&mut req.headers, API_KEY_HEADER, credential);

        let resp = self.send(req).await?;
        let body = read_body(resp.body).await?;
        let parsed = chat_response::parse_response(&body)?;
        let now = OffsetDateTime::now_utc();

        if invocation.stream {
            let chunks = chat_response::transform_response_to_chunks(&model, parsed, now)?;
            return Ok(ChatReply::Stream(chunks_from_vec(chunks)));
        }
        let completion = chat_response::transform_response(&model, parsed, now)?;
        serde_json::to_value(completion)
            .map(ChatReply::Complete)
            .map_err(|err| UpstreamError::Decode(err.to_string()))
    }

    pub async fn generate_image(
        &self,
        credential: Option<&str>,
        request: GenerateImageRequest,
    ) -> Result<GenerateImageResponse, UpstreamError> {
        let credential = credential.ok_or(UpstreamError::NoCredential)?;
        let url = self.url(&format!("/v1beta/models/{}:generateImage", request.model));
        let mut req = UpstreamHttpRequest::post_json(url, encode(&request.body)?);
        header_set(&mut req.headers, API_KEY_HEADER, credential);

        let resp = self.send(req).await?;
        let body = read_body(resp.body).await?;
        parse_image_response(&body)
    }

    /// One upstream exchange bounded by the request timeout. Non-2xx replies
    /// come back as the matching `UpstreamError`.
    async fn send(&self, req: UpstreamHttpRequest) -> Result<UpstreamHttpResponse, UpstreamError> {
        let url = req.url.clone();
        debug!(event = "upstream_request", url = %url, is_stream = req.is_stream);

        let resp = tokio::time::timeout(self.request_timeout, self.client.send(req))
            .await
            .map_err(|_| {
                UpstreamError::Timeout(format!(
                    "no reply within {}s",
                    self.request_timeout.as_secs()
                ))
            })
            .and_then(|result| result)
            .inspect_err(|err| warn!(event = "upstream_failed", url = %url, error = %err))?;

        if resp.is_success() {
            return Ok(resp);
        }
        let status = resp.status;
        let body = read_body(resp.body).await.unwrap_or_default();
        let err = UpstreamError::from_status(status, &body);
        warn!(event = "upstream_failed", url = %url, status, error = %err);
        Err(err)
    }
}

#[async_trait]
impl ImageFetcher for GeminiInvoker {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ImageFetchError> {
        let transport = |message: String| ImageFetchError::Transport {
            url: url.to_string(),
            message,
        };
        let resp = tokio::time::timeout(
            self.request_timeout,
            self.client.send(UpstreamHttpRequest::get(url)),
        )
        .await
        .map_err(|_| transport("timed out".to_string()))?
        .map_err(|err| transport(err.to_string()))?;

        if !resp.is_success() {
            return Err(ImageFetchError::Status {
                url: url.to_string(),
                status: resp.status,
            });
        }
        let content_type = header_get(&resp.headers, "content-type").map(str::to_string);
        let bytes = read_body(resp.body)
            .await
            .map_err(|err| transport(err.to_string()))?;
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

fn encode<T: serde::Serialize>(body: &T) -> Result<Bytes, UpstreamError> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|err| UpstreamError::Decode(err.to_string()))
}

async fn read_body(body: UpstreamBody) -> Result<Bytes, UpstreamError> {
    match body {
        UpstreamBody::Bytes(bytes) => Ok(bytes),
        UpstreamBody::Stream(mut rx) => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = rx.recv().await {
                buf.extend_from_slice(&chunk?);
            }
            Ok(buf.freeze())
        }
    }
}
