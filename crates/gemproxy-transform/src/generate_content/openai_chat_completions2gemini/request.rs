use gemproxy_protocol::gemini::generate_content::request::{
    GenerateContentRequest, GenerateContentRequestBody, GenerationConfig,
};
use gemproxy_protocol::gemini::types::{Content, ContentRole, Part};
use gemproxy_protocol::openai::create_chat_completions::types::ChatRole;

use crate::normalize::{NormalizedContent, NormalizedMessage};

/// Build a native `generateContent` request from normalized messages.
///
/// Assistant turns become `model` turns and every other role is sent as `user`.
/// Messages that end up without parts are skipped.
pub fn transform_request(
    model: &str,
    messages: Vec<NormalizedMessage>,
    temperature: f64,
    max_tokens: i64,
) -> GenerateContentRequest {
    let contents = messages.into_iter().filter_map(map_message).collect();

    GenerateContentRequest {
        model: model.strip_prefix("models/").unwrap_or(model).to_string(),
        body: GenerateContentRequestBody {
            contents,
            generation_config: Some(GenerationConfig {
                temperature: Some(temperature),
                max_output_tokens: Some(max_tokens),
            }),
        },
    }
}

fn map_message(message: NormalizedMessage) -> Option<Content> {
    let role = match message.role {
        ChatRole::Assistant => ContentRole::Model,
        ChatRole::System | ChatRole::User | ChatRole::Tool => ContentRole::User,
    };
    let parts = match message.content? {
        NormalizedContent::Text(text) => vec![Part::text(text)],
        NormalizedContent::Parts(parts) => parts,
    };
    if parts.is_empty() {
        return None;
    }
    Some(Content {
        role: Some(role),
        parts,
    })
}
