//! Per-request context: the candidate API keys extracted from the inbound
//! headers (spec.md §6) and a generated request id for error correlation
//! (spec.md §7).

use axum::http::HeaderMap;
use rate_limit::ApiKeyCandidate;

use crate::error::LlmError;

/// Everything the adapter needs that isn't part of the client's JSON body.
#[derive(Debug)]
pub struct RequestContext {
    /// Keys parsed from `Authorization: Bearer <k1,k2,...>`, `x-api-key`, or
    /// `x-goog-api-key`, in that header-precedence order.
    pub api_keys: Vec<ApiKeyCandidate>,
    /// Correlation id echoed on the response as `x-request-id`.
    pub request_id: String,
}

/// Extract the candidate API keys from the inbound headers (spec.md §6:
/// "comma-separated. Whitespace trimmed; empty entries discarded. Missing
/// header → 401").
pub fn extract_context(headers: &HeaderMap, request_id: String) -> crate::error::Result<RequestContext> {
    let raw = header_value(headers, "authorization")
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .or_else(|| header_value(headers, "x-api-key"))
        .or_else(|| header_value(headers, "x-goog-api-key"));

    let Some(raw) = raw else {
        return Err(LlmError::Authentication("no API key supplied".to_string()));
    };

    let api_keys: Vec<ApiKeyCandidate> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ApiKeyCandidate::new)
        .collect();

    if api_keys.is_empty() {
        return Err(LlmError::Authentication("no API key supplied".to_string()));
    }

    Ok(RequestContext { api_keys, request_id })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::*;

    #[test]
    fn parses_comma_separated_bearer_keys() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer k1, k2 , ,k3"));

        let ctx = extract_context(&headers, "req-1".to_string()).unwrap();
        let hashes: Vec<_> = ctx.api_keys.iter().map(|c| c.hash.clone()).collect();
        assert_eq!(hashes.len(), 3);
    }

    #[test]
    fn falls_back_to_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("abc"));

        let ctx = extract_context(&headers, "req-2".to_string()).unwrap();
        assert_eq!(ctx.api_keys.len(), 1);
    }

    #[test]
    fn missing_header_is_authentication_error() {
        let headers = HeaderMap::new();
        let err = extract_context(&headers, "req-3".to_string()).unwrap_err();
        assert_eq!(err.kind(), "authentication");
    }
}
