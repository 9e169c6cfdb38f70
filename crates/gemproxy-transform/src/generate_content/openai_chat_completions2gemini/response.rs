use gemproxy_protocol::gemini::generate_content::response::{
    Candidate, FinishReason, GenerateContentResponse, UsageMetadata,
};
use gemproxy_protocol::openai::create_chat_completions::response::{
    ChatCompletionChoice, ChatCompletionObjectType, ChatCompletionResponseMessage,
    CreateChatCompletionResponse,
};
use gemproxy_protocol::openai::create_chat_completions::stream::{
    ChatCompletionChunkObjectType, ChatCompletionStreamChoice, ChatCompletionStreamResponseDelta,
    CreateChatCompletionStreamResponse,
};
use gemproxy_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatRole, CompletionUsage,
};
use gemproxy_provider_core::UpstreamError;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::stream::UpstreamChunk;

/// Convert a native `generateContent` reply into an OpenAI chat completion.
///
/// Only the first candidate is used. A reply without candidates is an error.
pub fn transform_response(
    model: &str,
    response: GenerateContentResponse,
    now: OffsetDateTime,
) -> Result<CreateChatCompletionResponse, UpstreamError> {
    let candidate = first_candidate(&response)?;

    Ok(CreateChatCompletionResponse {
        id: completion_id(now),
        object: ChatCompletionObjectType::ChatCompletion,
        created: now.unix_timestamp(),
        model: model.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionResponseMessage {
                role: ChatRole::Assistant,
                content: candidate.text(),
            },
            finish_reason: map_finish_reason(candidate.finish_reason),
        }],
        usage: response.usage_metadata.as_ref().map(map_usage).unwrap_or_default(),
    })
}

/// Replay a complete native reply as a two-chunk stream: the full text, then
/// the terminal chunk carrying the finish reason.
pub fn transform_response_to_chunks(
    model: &str,
    response: GenerateContentResponse,
    now: OffsetDateTime,
) -> Result<Vec<UpstreamChunk>, UpstreamError> {
    let candidate = first_candidate(&response)?;
    let id = completion_id(now);
    let created = now.unix_timestamp();

    let chunk = |delta: ChatCompletionStreamResponseDelta,
                 finish_reason: Option<ChatCompletionFinishReason>|
     -> Result<UpstreamChunk, UpstreamError> {
        let chunk = CreateChatCompletionStreamResponse {
            id: id.clone(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created,
            model: model.to_string(),
            choices: vec![ChatCompletionStreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        };
        serde_json::to_value(chunk)
            .map(UpstreamChunk)
            .map_err(|err| UpstreamError::Decode(err.to_string()))
    };

    Ok(vec![
        chunk(
            ChatCompletionStreamResponseDelta {
                role: Some(ChatRole::Assistant),
                content: Some(candidate.text()),
            },
            None,
        )?,
        chunk(
            ChatCompletionStreamResponseDelta::default(),
            Some(map_finish_reason(candidate.finish_reason)),
        )?,
    ])
}

/// Parse a native reply body.
pub fn parse_response(body: &[u8]) -> Result<GenerateContentResponse, UpstreamError> {
    serde_json::from_slice(body).map_err(|err| UpstreamError::Decode(err.to_string()))
}

/// Parse an OpenAI-compatible reply body, keeping its exact field shape.
pub fn parse_compat_response(body: &[u8]) -> Result<JsonValue, UpstreamError> {
    serde_json::from_slice(body).map_err(|err| UpstreamError::Decode(err.to_string()))
}

fn first_candidate(response: &GenerateContentResponse) -> Result<&Candidate, UpstreamError> {
    response
        .candidates
        .first()
        .ok_or_else(|| UpstreamError::UpstreamOther {
            status: 200,
            message: "empty candidates".to_string(),
        })
}

fn completion_id(now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("chatcmpl-{millis}")
}

fn map_finish_reason(reason: Option<FinishReason>) -> ChatCompletionFinishReason {
    match reason {
        None | Some(FinishReason::Stop) => ChatCompletionFinishReason::Stop,
        Some(_) => ChatCompletionFinishReason::Length,
    }
}

fn map_usage(usage: &UsageMetadata) -> CompletionUsage {
    CompletionUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn reply(value: JsonValue) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_first_candidate() {
        let response = reply(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "a " }, { "text": "cat" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5 }
        }));

        let completion = transform_response("gemini-2.0-flash", response, at()).unwrap();

        assert_eq!(
            serde_json::to_value(&completion).unwrap(),
            json!({
                "id": "chatcmpl-1700000000000",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "gemini-2.0-flash",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "a cat" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
            })
        );
    }

    #[test]
    fn non_stop_reason_is_length() {
        let response = reply(json!({
            "candidates": [{ "content": { "parts": [{ "text": "cut" }] }, "finishReason": "MAX_TOKENS" }]
        }));
        let completion = transform_response("gemini-1.5-pro", response, at()).unwrap();
        assert_eq!(
            completion.choices[0].finish_reason,
            ChatCompletionFinishReason::Length
        );
        assert_eq!(completion.usage, CompletionUsage::default());
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let err = transform_response("gemini-1.5-pro", reply(json!({})), at()).unwrap_err();
        assert!(matches!(err, UpstreamError::UpstreamOther { .. }));
    }

    #[test]
    fn synthesizes_text_then_terminal_chunk() {
        let response = reply(json!({
            "candidates": [{ "content": { "parts": [{ "text": "hello" }] }, "finishReason": "STOP" }]
        }));

        let chunks = transform_response_to_chunks("gemini-2.0-flash", response, at()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].delta_text(), Some("hello"));
        assert_eq!(chunks[0].finish_reason(), None);
        assert_eq!(chunks[0].0["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(chunks[1].0["choices"][0]["delta"], json!({}));
        assert_eq!(chunks[1].finish_reason(), Some("stop"));
        assert_eq!(chunks[1].0["object"], "chat.completion.chunk");
    }
}
