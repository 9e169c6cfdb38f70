use gemproxy_protocol::openai::error::{ErrorDetail, ErrorResponse};
use gemproxy_provider_core::{ProxyResponse, UpstreamError};
use http::StatusCode;

/// A failure that ends a request with a JSON error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

impl ProxyError {
    pub fn new(
        status: StatusCode,
        kind: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            kind,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            code,
            message,
        )
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "path_not_found",
            format!("path {path} does not exist"),
        )
    }

    /// Map an upstream failure. `server_code` names the operation for the
    /// catch-all 500 case.
    pub fn from_upstream(err: &UpstreamError, server_code: &'static str) -> Self {
        let message = err.to_string();
        match err {
            UpstreamError::NoCredential => Self::new(
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing_api_key",
                message,
            ),
            UpstreamError::AuthRejected { status, .. } => Self::new(
                StatusCode::from_u16(*status).unwrap_or(StatusCode::UNAUTHORIZED),
                "authentication_error",
                "invalid_api_key",
                message,
            ),
            UpstreamError::AccessDenied { .. } => Self::new(
                StatusCode::FORBIDDEN,
                "permission_error",
                "access_denied",
                message,
            ),
            UpstreamError::RateLimited { .. } => Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
                message,
            ),
            UpstreamError::ConnectionFailure(_)
            | UpstreamError::Timeout(_)
            | UpstreamError::UpstreamServerError { .. }
            | UpstreamError::UpstreamOther { .. }
            | UpstreamError::Interrupted(_)
            | UpstreamError::Decode(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                server_code,
                message,
            ),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                message: self.message.clone(),
                r#type: self.kind.to_string(),
                code: self.code.clone(),
                request_id: self.request_id.clone(),
            },
        }
    }

    pub fn into_response(self) -> ProxyResponse {
        let body = serde_json::to_vec(&self.body()).unwrap_or_default();
        ProxyResponse::json(self.status, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_auth_status_is_kept() {
        let err = ProxyError::from_upstream(
            &UpstreamError::AuthRejected {
                status: 401,
                message: "API key not valid".to_string(),
            },
            "gemini_proxy_error",
        );
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.kind, "authentication_error");
    }

    #[test]
    fn server_side_failures_are_internal() {
        let err = ProxyError::from_upstream(
            &UpstreamError::UpstreamServerError {
                status: 503,
                message: "overloaded".to_string(),
            },
            "image_generation_error",
        )
        .with_request_id("req-1");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["error"]["type"], "internal_error");
        assert_eq!(body["error"]["code"], "image_generation_error");
        assert_eq!(body["error"]["request_id"], "req-1");
    }

    #[test]
    fn rate_limit_and_access_denied() {
        let limited = ProxyError::from_upstream(
            &UpstreamError::RateLimited {
                message: "quota".to_string(),
            },
            "gemini_proxy_error",
        );
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        let denied = ProxyError::from_upstream(
            &UpstreamError::AccessDenied {
                message: "no".to_string(),
            },
            "gemini_proxy_error",
        );
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.kind, "permission_error");
    }
}
