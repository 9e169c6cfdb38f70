pub mod generate_content;
pub mod generate_image;
pub mod types;
