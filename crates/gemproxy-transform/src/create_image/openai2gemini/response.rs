use gemproxy_protocol::gemini::generate_image::response::GenerateImageResponse;
use gemproxy_protocol::openai::create_image::response::{CreateImageResponse, ImageData};
use gemproxy_provider_core::UpstreamError;
use time::OffsetDateTime;

/// Convert a `generateImage` reply into the OpenAI images shape.
///
/// Every image is returned as a JPEG data URL and echoes the prompt as
/// `revised_prompt`. Entries without image bytes are skipped.
pub fn transform_response(
    prompt: &str,
    response: GenerateImageResponse,
    now: OffsetDateTime,
) -> CreateImageResponse {
    let data = response
        .generated_images
        .into_iter()
        .filter_map(|image| image.bytes_base64_encoded)
        .map(|bytes| ImageData {
            url: format!("data:image/jpeg;base64,{bytes}"),
            revised_prompt: prompt.to_string(),
        })
        .collect();

    CreateImageResponse {
        created: now.unix_timestamp(),
        data,
    }
}

pub fn parse_response(body: &[u8]) -> Result<GenerateImageResponse, UpstreamError> {
    serde_json::from_slice(body).map_err(|err| UpstreamError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wraps_images_as_data_urls() {
        let reply = parse_response(
            br#"{"generatedImages":[{"bytesBase64Encoded":"QUJD"},{"mimeType":"image/png"},{"bytesBase64Encoded":"REVG"}]}"#,
        )
        .unwrap();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        let response = transform_response("a red fox", reply, now);

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "created": 1_700_000_000,
                "data": [
                    { "url": "data:image/jpeg;base64,QUJD", "revised_prompt": "a red fox" },
                    { "url": "data:image/jpeg;base64,REVG", "revised_prompt": "a red fox" }
                ]
            })
        );
    }

    #[test]
    fn missing_images_yield_empty_data() {
        let reply = parse_response(b"{}").unwrap();
        let response = transform_response("x", reply, OffsetDateTime::UNIX_EPOCH);
        assert!(response.data.is_empty());
    }
}
