use gemproxy_protocol::gemini::generate_image::request::{
    AspectRatio, GenerateImageRequest, GenerateImageRequestBody, ImageGenerationConfig,
    ImagePrompt,
};

/// Map an OpenAI `WxH` size onto the aspect ratios `generateImage` understands.
pub fn aspect_ratio_for_size(size: &str) -> AspectRatio {
    match size {
        "1024x1792" | "512x896" => AspectRatio::Portrait,
        "1792x1024" | "896x512" => AspectRatio::Landscape,
        _ => AspectRatio::Square,
    }
}

pub fn transform_request(model: &str, prompt: &str, size: &str, n: u32) -> GenerateImageRequest {
    GenerateImageRequest {
        model: model.to_string(),
        body: GenerateImageRequestBody {
            prompt: ImagePrompt {
                text: prompt.to_string(),
            },
            generation_config: ImageGenerationConfig {
                aspect_ratio: aspect_ratio_for_size(size),
                number_of_images: n,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sizes_map_to_aspect_ratios() {
        assert_eq!(aspect_ratio_for_size("1024x1792"), AspectRatio::Portrait);
        assert_eq!(aspect_ratio_for_size("512x896"), AspectRatio::Portrait);
        assert_eq!(aspect_ratio_for_size("1792x1024"), AspectRatio::Landscape);
        assert_eq!(aspect_ratio_for_size("896x512"), AspectRatio::Landscape);
        assert_eq!(aspect_ratio_for_size("1024x1024"), AspectRatio::Square);
        assert_eq!(aspect_ratio_for_size("bogus"), AspectRatio::Square);
    }

    #[test]
    fn builds_request_body() {
        let request = transform_request("imagen-3.0-generate-001", "a red fox", "1792x1024", 2);
        assert_eq!(request.model, "imagen-3.0-generate-001");
        assert_eq!(
            serde_json::to_value(&request.body).unwrap(),
            json!({
                "prompt": { "text": "a red fox" },
                "generationConfig": { "aspectRatio": "landscape", "numberOfImages": 2 }
            })
        );
    }
}
