/// Shared request plumbing
use axum::http::HeaderMap;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }
}
