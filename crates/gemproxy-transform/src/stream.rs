use std::collections::VecDeque;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use gemproxy_protocol::sse::{self, DONE_FRAME, DONE_SENTINEL, SseParser};
use gemproxy_provider_core::UpstreamError;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

/// One `chat.completion.chunk` as received from upstream.
///
/// Kept as raw JSON so the relayed frame has exactly the upstream field shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamChunk(pub JsonValue);

impl UpstreamChunk {
    pub fn delta_text(&self) -> Option<&str> {
        self.0.pointer("/choices/0/delta/content")?.as_str()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.0.pointer("/choices/0/finish_reason")?.as_str()
    }
}

/// Single-pass, forward-only sequence of upstream chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UpstreamChunk, UpstreamError>> + Send>>;

/// Translator states; `Streaming` owns the upstream sequence.
enum TranslatorState {
    Streaming(ChunkStream),
    Finalizing,
    Done,
}

/// The closing chunk appended after the last upstream chunk.
pub fn closing_chunk() -> JsonValue {
    json!({ "choices": [{ "delta": {}, "finish_reason": "stop" }] })
}

/// Re-emit `chunks` as OpenAI-style SSE frames.
///
/// One frame per upstream chunk, in arrival order, then one closing chunk with
/// `finish_reason: "stop"` and the `[DONE]` sentinel. The upstream is polled only
/// when the consumer asks for the next frame, and dropping the returned stream
/// drops the upstream. An upstream failure is yielded as an `Err` item and ends
/// the stream without the closing frames.
pub fn translate(chunks: ChunkStream) -> impl Stream<Item = Result<Bytes, io::Error>> + Send {
    stream::unfold(TranslatorState::Streaming(chunks), |state| async move {
        match state {
            TranslatorState::Streaming(mut chunks) => match chunks.next().await {
                Some(Ok(chunk)) => match sse::json_frame(&chunk) {
                    Ok(frame) => Some((Ok(frame), TranslatorState::Streaming(chunks))),
                    Err(err) => Some((Err(io::Error::other(err)), TranslatorState::Done)),
                },
                Some(Err(err)) => {
                    warn!(event = "stream_interrupted", error = %err);
                    Some((Err(io::Error::other(err)), TranslatorState::Done))
                }
                None => match sse::json_frame(&closing_chunk()) {
                    Ok(frame) => Some((Ok(frame), TranslatorState::Finalizing)),
                    Err(err) => Some((Err(io::Error::other(err)), TranslatorState::Done)),
                },
            },
            TranslatorState::Finalizing => {
                debug!(event = "stream_finished");
                Some((Ok(Bytes::from_static(DONE_FRAME)), TranslatorState::Done))
            }
            TranslatorState::Done => None,
        }
    })
}

/// Ready-made chunks as a stream, for replies synthesized in one piece.
pub fn chunks_from_vec(chunks: Vec<UpstreamChunk>) -> ChunkStream {
    Box::pin(stream::iter(chunks.into_iter().map(Ok)))
}

struct DecoderState<S> {
    bytes: S,
    parser: SseParser,
    pending: VecDeque<String>,
    finished: bool,
}

/// Decode the upstream's SSE body into chunks.
///
/// The upstream's own `[DONE]` frame ends the sequence; a body that closes
/// without it ends the sequence too. Undecodable frames surface as
/// `UpstreamError::Decode`.
pub fn decode_sse_chunks<S>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send + Unpin + 'static,
{
    let state = DecoderState {
        bytes,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                if payload.trim() == DONE_SENTINEL {
                    state.pending.clear();
                    state.finished = true;
                    return None;
                }
                let item = serde_json::from_str::<JsonValue>(&payload)
                    .map(UpstreamChunk)
                    .map_err(|err| UpstreamError::Decode(err.to_string()));
                if item.is_err() {
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.parser.push(&chunk)),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    state.pending.extend(state.parser.finish());
                }
            }
        }
    }))
}
