use bytes::Bytes;
use serde::Serialize;

/// Payload of the terminal frame OpenAI clients wait for.
pub const DONE_SENTINEL: &str = "[DONE]";
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";
pub const CONTENT_TYPE: &str = "text/event-stream";

/// Encode `value` as a single `data: <json>\n\n` frame.
pub fn json_frame<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    let payload = serde_json::to_vec(value)?;
    Ok(data_frame(&payload))
}

pub fn data_frame(payload: &[u8]) -> Bytes {
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(payload);
    frame.extend_from_slice(b"\n\n");
    Bytes::from(frame)
}

/// Incremental decoder for `data:` frames.
///
/// Bytes may arrive split at arbitrary points, including inside a UTF-8
/// sequence; incomplete tails are carried to the next push. `event:`, `id:`
/// and comment lines are skipped.
#[derive(Debug, Default)]
pub struct SseParser {
    raw: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payload of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.raw.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.raw.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.raw.drain(..=pos).collect();
            let decoded = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text: &str = &decoded;
            self.handle_line(text.strip_suffix('\r').unwrap_or(text), &mut payloads);
        }

        payloads
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.raw.is_empty() {
            let rest = std::mem::take(&mut self.raw);
            let decoded = String::from_utf8_lossy(&rest);
            let text: &str = &decoded;
            self.handle_line(text.strip_suffix('\r').unwrap_or(text), &mut payloads);
        }
        self.flush(&mut payloads);
        payloads
    }

    fn handle_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            self.flush(payloads);
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data_lines
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        } else if line == "data" {
            self.data_lines.push(String::new());
        }
    }

    fn flush(&mut self, payloads: &mut Vec<String>) {
        if self.data_lines.is_empty() {
            return;
        }
        payloads.push(self.data_lines.join("\n"));
        self.data_lines.clear();
    }
}
