use gemproxy_protocol::openai::list_models::response::{
    ListModelsResponse, ListObjectType, Model, ModelObjectType,
};

pub const CHAT_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.5-flash-lite-preview-06-17",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];

pub const IMAGE_MODELS: &[&str] = &[
    "imagen-3.0-generate-001",
    "imagen-3.0-fast-generate-001",
    "imagen-2.0-generate-001",
];

pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-001";

pub fn is_chat_model(model: &str) -> bool {
    CHAT_MODELS.iter().any(|known| *known == model)
}

pub fn is_image_model(model: &str) -> bool {
    IMAGE_MODELS.iter().any(|known| *known == model)
}

/// Every registered model, chat models first.
pub fn all_models() -> impl Iterator<Item = &'static str> {
    CHAT_MODELS.iter().chain(IMAGE_MODELS).copied()
}

pub fn model_count() -> usize {
    CHAT_MODELS.len() + IMAGE_MODELS.len()
}

pub fn list_models(created: i64) -> ListModelsResponse {
    ListModelsResponse {
        object: ListObjectType::List,
        data: all_models()
            .map(|id| Model {
                id: id.to_string(),
                object: ModelObjectType::Model,
                created,
                owned_by: "google".to_string(),
                permission: Vec::new(),
                root: id.to_string(),
                parent: None,
            })
            .collect(),
    }
}
