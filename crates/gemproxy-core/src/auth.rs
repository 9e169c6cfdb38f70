use http::HeaderMap;
use http::header::AUTHORIZATION;

/// Pick the Gemini API key for one request.
///
/// `Authorization: Bearer <key>` wins (scheme matched case-insensitively);
/// otherwise the configured default is used. `None` means no key at all and
/// the caller decides whether that is fatal.
pub fn extract_credential(headers: &HeaderMap, default_key: Option<&str>) -> Option<String> {
    headers
        .get_all(AUTHORIZATION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(bearer_token)
        .or_else(|| default_key.filter(|key| !key.is_empty()).map(str::to_string))
}

fn bearer_token(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn bearer_header_wins_over_default() {
        assert_eq!(
            extract_credential(&headers("Bearer abc"), Some("env")),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_credential(&headers("bEaReR   xyz "), None),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn any_whitespace_separates_scheme_and_token() {
        assert_eq!(
            extract_credential(&headers("Bearer\tabc"), Some("env")),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_credential(&headers("Bearer \t key "), None),
            Some("key".to_string())
        );
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(
            extract_credential(&HeaderMap::new(), Some("env")),
            Some("env".to_string())
        );
        assert_eq!(
            extract_credential(&headers("Basic dXNlcjpwYXNz"), Some("env")),
            Some("env".to_string())
        );
        assert_eq!(extract_credential(&headers("Bearer "), None), None);
        assert_eq!(extract_credential(&HeaderMap::new(), Some("")), None);
    }
}
