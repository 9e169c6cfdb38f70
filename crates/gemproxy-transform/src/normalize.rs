use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use gemproxy_protocol::gemini::types::{Blob, Part};
use gemproxy_protocol::openai::create_chat_completions::types::{
    ChatMessage, ChatRole, ContentPart, ImageUrl, MessageContent,
};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{debug, warn};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    /// Raw `Content-Type` header of the download, if any.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageFetchError {
    #[error("failed to download image {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to download image {url}: {message}")]
    Transport { url: String, message: String },
    #[error("malformed data URL: missing ',' before the payload")]
    MalformedDataUrl,
}

/// Downloads remote images referenced by `image_url` parts.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ImageFetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedContent {
    Text(String),
    /// Text and inline images, in the order the client sent them.
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub role: ChatRole,
    pub content: Option<NormalizedContent>,
    pub extra: JsonMap<String, JsonValue>,
}

impl NormalizedMessage {
    pub fn has_inline_image(&self) -> bool {
        matches!(
            &self.content,
            Some(NormalizedContent::Parts(parts)) if parts.iter().any(|part| part.inline_data.is_some())
        )
    }
}

/// Resolve every message into a shape the upstream accepts verbatim.
///
/// Text-only part arrays collapse into one newline-joined string. Arrays with
/// images keep their order and get every image resolved to inline base64; an
/// image that cannot be resolved becomes a visible placeholder text part and
/// the remaining parts are still processed.
pub async fn normalize_messages(
    messages: Vec<ChatMessage>,
    fetcher: &dyn ImageFetcher,
) -> Vec<NormalizedMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let content = match message.content {
            None => None,
            Some(MessageContent::Text(text)) => Some(NormalizedContent::Text(text)),
            Some(content @ MessageContent::Parts(_)) if !content.has_image() => {
                Some(NormalizedContent::Text(join_text_parts(content)))
            }
            Some(MessageContent::Parts(parts)) => {
                Some(NormalizedContent::Parts(resolve_parts(parts, fetcher).await))
            }
        };
        out.push(NormalizedMessage {
            role: message.role,
            content,
            extra: message.extra,
        });
    }
    out
}

pub fn has_inline_image(messages: &[NormalizedMessage]) -> bool {
    messages.iter().any(NormalizedMessage::has_inline_image)
}

/// Back to OpenAI messages, for the OpenAI-compatible endpoint.
pub fn to_openai_messages(messages: Vec<NormalizedMessage>) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .map(|message| ChatMessage {
            role: message.role,
            content: message.content.map(|content| match content {
                NormalizedContent::Text(text) => MessageContent::Text(text),
                NormalizedContent::Parts(parts) => {
                    MessageContent::Parts(parts.into_iter().filter_map(part_to_openai).collect())
                }
            }),
            extra: message.extra,
        })
        .collect()
}

fn part_to_openai(part: Part) -> Option<ContentPart> {
    if let Some(Blob { mime_type, data }) = part.inline_data {
        return Some(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{mime_type};base64,{data}"),
                detail: None,
            },
        });
    }
    part.text.map(|text| ContentPart::Text { text })
}

fn join_text_parts(content: MessageContent) -> String {
    let MessageContent::Parts(parts) = content else {
        return String::new();
    };
    parts
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn resolve_parts(parts: Vec<ContentPart>, fetcher: &dyn ImageFetcher) -> Vec<Part> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            ContentPart::Text { text } => out.push(Part::text(text)),
            ContentPart::ImageUrl { image_url } => {
                match resolve_image(&image_url.url, fetcher).await {
                    Ok(part) => out.push(part),
                    Err(err) => {
                        warn!(event = "image_fetch_failed", error = %err);
                        out.push(Part::text(format!("[image processing failed: {err}]")));
                    }
                }
            }
            ContentPart::Unsupported => {}
        }
    }
    out
}

async fn resolve_image(url: &str, fetcher: &dyn ImageFetcher) -> Result<Part, ImageFetchError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let image = fetcher.fetch(url).await?;
        let mime = image
            .content_type
            .as_deref()
            .and_then(mime_essence)
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime_from_url(url).to_string());
        debug!(event = "image_fetched", bytes = image.bytes.len(), mime = %mime);
        return Ok(Part::inline(mime, STANDARD.encode(&image.bytes)));
    }

    if let Some(rest) = url.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or(ImageFetchError::MalformedDataUrl)?;
        let mime = header
            .split(';')
            .next()
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME);
        return Ok(Part::inline(mime, payload));
    }

    Ok(Part::inline(DEFAULT_IMAGE_MIME, url))
}

/// `image/png; charset=binary` -> `image/png`.
fn mime_essence(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
}

pub fn guess_mime_from_url(url: &str) -> &'static str {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        DEFAULT_IMAGE_MIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedFetcher {
        content_type: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedFetcher {
        fn new(content_type: Option<&'static str>) -> Self {
            Self {
                content_type,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageFetcher for FixedFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedImage, ImageFetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if url.contains("missing") {
                return Err(ImageFetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(FetchedImage {
                bytes: Bytes::from_static(b"\x89PNG"),
                content_type: self.content_type.map(str::to_string),
            })
        }
    }

    fn user_parts(parts: Vec<ContentPart>) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            content: Some(MessageContent::Parts(parts)),
            extra: JsonMap::new(),
        }
    }

    fn text(value: &str) -> ContentPart {
        ContentPart::Text {
            text: value.to_string(),
        }
    }

    fn image(url: &str) -> ContentPart {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.to_string(),
                detail: None,
            },
        }
    }

    #[tokio::test]
    async fn string_content_passes_through() {
        let fetcher = FixedFetcher::new(None);
        let out = normalize_messages(vec![ChatMessage::text(ChatRole::System, "be brief")], &fetcher)
            .await;
        assert_eq!(
            out[0].content,
            Some(NormalizedContent::Text("be brief".to_string()))
        );
    }

    #[tokio::test]
    async fn text_parts_join_with_newlines() {
        let fetcher = FixedFetcher::new(None);
        let message = user_parts(vec![text("a"), ContentPart::Unsupported, text("b")]);
        let out = normalize_messages(vec![message], &fetcher).await;
        assert_eq!(
            out[0].content,
            Some(NormalizedContent::Text("a\nb".to_string()))
        );
        assert!(!has_inline_image(&out));
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_parts_keep_order() {
        let fetcher = FixedFetcher::new(Some("image/png; charset=binary"));
        let message = user_parts(vec![
            text("before"),
            image("https://img.example/cat"),
            text("between"),
            image("data:image/webp;base64,AAAA"),
            image("QkJCQg=="),
        ]);
        let out = normalize_messages(vec![message], &fetcher).await;
        let Some(NormalizedContent::Parts(parts)) = &out[0].content else {
            panic!("expected parts");
        };
        assert_eq!(
            parts,
            &vec![
                Part::text("before"),
                Part::inline("image/png", STANDARD.encode(b"\x89PNG")),
                Part::text("between"),
                Part::inline("image/webp", "AAAA"),
                Part::inline("image/jpeg", "QkJCQg=="),
            ]
        );
        assert!(has_inline_image(&out));
    }

    #[tokio::test]
    async fn failed_download_becomes_placeholder() {
        let fetcher = FixedFetcher::new(None);
        let message = user_parts(vec![
            image("https://img.example/missing.png"),
            text("still here"),
        ]);
        let out = normalize_messages(vec![message], &fetcher).await;
        let Some(NormalizedContent::Parts(parts)) = &out[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 2);
        let placeholder = parts[0].text.as_deref().unwrap();
        assert!(placeholder.starts_with("[image processing failed"));
        assert!(placeholder.contains("HTTP 404"));
        assert_eq!(parts[1], Part::text("still here"));
        assert!(!has_inline_image(&out));
    }

    #[tokio::test]
    async fn mime_falls_back_to_url_extension() {
        let fetcher = FixedFetcher::new(None);
        let message = user_parts(vec![
            image("https://img.example/a.PNG?size=2"),
            image("https://img.example/b.webp"),
            image("https://img.example/c.gif"),
        ]);
        let out = normalize_messages(vec![message], &fetcher).await;
        let Some(NormalizedContent::Parts(parts)) = &out[0].content else {
            panic!("expected parts");
        };
        let mimes: Vec<&str> = parts
            .iter()
            .map(|part| part.inline_data.as_ref().unwrap().mime_type.as_str())
            .collect();
        assert_eq!(mimes, vec!["image/png", "image/webp", "image/jpeg"]);
    }

    #[tokio::test]
    async fn data_url_without_mime_defaults_to_jpeg() {
        let fetcher = FixedFetcher::new(None);
        let out = normalize_messages(vec![user_parts(vec![image("data:;base64,Zm9v")])], &fetcher)
            .await;
        let Some(NormalizedContent::Parts(parts)) = &out[0].content else {
            panic!("expected parts");
        };
        assert_eq!(parts[0], Part::inline("image/jpeg", "Zm9v"));
    }

    #[tokio::test]
    async fn normalizing_twice_is_identical() {
        let fetcher = FixedFetcher::new(Some("image/png"));
        let messages = vec![
            ChatMessage::text(ChatRole::System, "sys"),
            user_parts(vec![text("look"), image("https://img.example/x.png")]),
        ];
        let first = normalize_messages(messages.clone(), &fetcher).await;
        let second = normalize_messages(messages, &fetcher).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn openai_round_trip_keeps_extra_fields() {
        let fetcher = FixedFetcher::new(None);
        let mut message = ChatMessage::text(ChatRole::Tool, "42");
        message
            .extra
            .insert("tool_call_id".to_string(), JsonValue::from("call_1"));
        let out = to_openai_messages(normalize_messages(vec![message.clone()], &fetcher).await);
        assert_eq!(out, vec![message]);
    }
}
