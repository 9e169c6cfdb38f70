//! Translation between the OpenAI shapes clients speak and what Gemini expects.
//!
//! Nothing here performs network IO directly: image downloads go through the
//! [`normalize::ImageFetcher`] seam and upstream chunks arrive as a stream.

pub mod create_image;
pub mod generate_content;
pub mod normalize;
pub mod stream;

pub use normalize::{
    FetchedImage, ImageFetchError, ImageFetcher, NormalizedContent, NormalizedMessage,
    has_inline_image, normalize_messages, to_openai_messages,
};
pub use stream::{ChunkStream, UpstreamChunk, decode_sse_chunks, translate};
