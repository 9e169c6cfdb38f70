pub mod create_chat_completions;
pub mod create_image;
pub mod error;
pub mod list_models;
