use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Always a `data:image/jpeg;base64,...` URL.
    pub url: String,
    pub revised_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateImageResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}
