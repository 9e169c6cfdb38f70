use std::io;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use gemproxy_provider_core::UpstreamError;
use gemproxy_transform::stream::{ChunkStream, UpstreamChunk, chunks_from_vec, translate};
use serde_json::{Value as JsonValue, json};

fn chunk(text: &str) -> UpstreamChunk {
    UpstreamChunk(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1,
        "model": "gemini-2.0-flash",
        "choices": [{ "index": 0, "delta": { "content": text }, "finish_reason": null }]
    }))
}

async fn collect(chunks: ChunkStream) -> Vec<Result<Bytes, io::Error>> {
    translate(chunks).collect().await
}

fn payload(frame: &Bytes) -> JsonValue {
    let text = std::str::from_utf8(frame).unwrap();
    let data = text
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap();
    serde_json::from_str(data).unwrap()
}

#[tokio::test]
async fn n_chunks_become_n_plus_two_frames() {
    for n in [0usize, 1, 5] {
        let chunks = (0..n).map(|i| chunk(&format!("t{i}"))).collect();
        let frames: Vec<Bytes> = collect(chunks_from_vec(chunks))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), n + 2);
        assert!(frames.iter().all(|frame| frame.starts_with(b"data: ")));
        assert_eq!(frames[n + 1], Bytes::from_static(b"data: [DONE]\n\n"));
        assert_eq!(
            payload(&frames[n]),
            json!({ "choices": [{ "delta": {}, "finish_reason": "stop" }] })
        );
    }
}

#[tokio::test]
async fn frames_relay_chunks_verbatim_in_order() {
    let chunks = vec![chunk("Hel"), chunk("lo"), chunk("!")];
    let frames: Vec<Bytes> = collect(chunks_from_vec(chunks.clone()))
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    for (frame, chunk) in frames.iter().zip(&chunks) {
        assert_eq!(payload(frame), chunk.0);
    }
}

#[tokio::test]
async fn upstream_failure_ends_without_done() {
    let upstream: ChunkStream = Box::pin(stream::iter(vec![
        Ok(chunk("partial")),
        Err(UpstreamError::Interrupted("connection reset".to_string())),
        Ok(chunk("never sent")),
    ]));

    let items = collect(upstream).await;

    assert_eq!(items.len(), 2);
    assert_eq!(payload(items[0].as_ref().unwrap())["choices"][0]["delta"]["content"], "partial");
    let err = items[1].as_ref().unwrap_err();
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn consumer_drop_stops_pulling_upstream() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let upstream: ChunkStream = Box::pin(stream::iter(0..100).map(move |i| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, UpstreamError>(chunk(&i.to_string()))
    }));

    let mut frames = Box::pin(translate(upstream));
    frames.next().await.unwrap().unwrap();
    frames.next().await.unwrap().unwrap();
    drop(frames);

    assert_eq!(pulled.load(Ordering::SeqCst), 2);
}
