use serde_json::Value as JsonValue;

/// Closed set of outcomes an upstream call can fail with.
///
/// Built once, where the transport or the upstream status is observed, so that
/// callers branch on the variant instead of inspecting raw responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("no Gemini API key: send `Authorization: Bearer <key>` or configure a default key")]
    NoCredential,
    #[error("cannot connect to the Gemini API: {0}")]
    ConnectionFailure(String),
    #[error("Gemini API did not answer in time: {0}")]
    Timeout(String),
    #[error("Gemini API key is invalid or expired: {message}")]
    AuthRejected { status: u16, message: String },
    #[error("Gemini API access denied, check the key's permissions: {message}")]
    AccessDenied { message: String },
    #[error("Gemini API rate limit exceeded, retry later: {message}")]
    RateLimited { message: String },
    #[error("Gemini API server error ({status}): {message}")]
    UpstreamServerError { status: u16, message: String },
    #[error("Gemini API error ({status}): {message}")]
    UpstreamOther { status: u16, message: String },
    #[error("upstream stream interrupted: {0}")]
    Interrupted(String),
    #[error("unexpected upstream payload: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Classify a non-2xx upstream reply.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = error_message(body).unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                format!("HTTP {status}")
            } else {
                text
            }
        });
        match status {
            401 => UpstreamError::AuthRejected { status, message },
            403 => UpstreamError::AccessDenied { message },
            429 => UpstreamError::RateLimited { message },
            500..=599 => UpstreamError::UpstreamServerError { status, message },
            _ => UpstreamError::UpstreamOther { status, message },
        }
    }
}

/// `error.message` from `{"error":{...}}` (OpenAI-compatible endpoint) or
/// `[{"error":{...}}]` (native endpoint).
fn error_message(body: &[u8]) -> Option<String> {
    let value: JsonValue = serde_json::from_slice(body).ok()?;
    let value = match value {
        JsonValue::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_taxonomy() {
        assert!(matches!(
            UpstreamError::from_status(401, b""),
            UpstreamError::AuthRejected { status: 401, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(403, b""),
            UpstreamError::AccessDenied { .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(429, b""),
            UpstreamError::RateLimited { .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(503, b""),
            UpstreamError::UpstreamServerError { status: 503, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(404, b""),
            UpstreamError::UpstreamOther { status: 404, .. }
        ));
    }

    #[test]
    fn message_from_either_error_envelope() {
        let object = br#"{"error":{"code":400,"message":"bad model"}}"#;
        let array = br#"[{"error":{"code":400,"message":"bad model"}}]"#;
        for body in [&object[..], &array[..]] {
            let UpstreamError::UpstreamOther { message, .. } = UpstreamError::from_status(400, body)
            else {
                panic!("expected UpstreamOther");
            };
            assert_eq!(message, "bad model");
        }
    }

    #[test]
    fn falls_back_to_raw_text() {
        let err = UpstreamError::from_status(502, b"  gateway down ");
        assert_eq!(
            err,
            UpstreamError::UpstreamServerError {
                status: 502,
                message: "gateway down".to_string()
            }
        );
    }
}
