//! Wire shapes spoken on both sides of the proxy.
//!
//! `openai` holds what downstream clients send and receive, `gemini` holds the
//! native Gemini payloads used when the OpenAI-compatible endpoint cannot be
//! used, and `sse` holds the event-stream framing shared by both.

pub mod gemini;
pub mod openai;
pub mod sse;
