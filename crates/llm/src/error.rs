//! Error taxonomy shared by every dialect (spec.md §4.8).
//!
//! Every failure the gateway can produce is one of these kinds. Each kind
//! carries a default HTTP status and knows how to render itself into each
//! client dialect's native error shape — there is no generic error payload
//! (spec.md §7: "Every failure is rendered per §4.8 in the client's own
//! dialect").

use serde_json::{Value, json};

/// A gateway error, tagged with the taxonomy kind from spec.md §4.8.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Malformed or out-of-range client request. Carries the offending
    /// field path (spec.md §4.1: "a non-empty `field` path").
    #[error("invalid request: {message} (field: {field})")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Dotted path to the offending field.
        field: String,
    },
    /// No usable API key was supplied, or the sole candidate is quarantined.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The key is recognized but forbidden from the requested operation.
    #[error("permission denied: {0}")]
    Permission(String),
    /// The requested model or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Quota or upstream rate limit exceeded.
    #[error("rate limit exceeded: {message}")]
    RateLimit {
        /// Human-readable description.
        message: String,
        /// Best-effort seconds until the limit resets, when known.
        retry_after_secs: Option<u64>,
    },
    /// The upstream call exceeded its per-attempt deadline.
    #[error("upstream call timed out")]
    Timeout,
    /// The upstream service returned a non-retryable error, or retries were
    /// exhausted.
    #[error("upstream API error ({status}): {message}")]
    UpstreamApi {
        /// Upstream HTTP status, when available.
        status: u16,
        /// Upstream error body or description.
        message: String,
    },
    /// A request or response failed to translate between dialects.
    #[error("transform error: {0}")]
    Transform(String),
    /// Anything else: bugs, I/O failures outside the upstream call, etc.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Convenience constructor for [`LlmError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// The taxonomy kind's stable wire name (not surfaced directly, but used
    /// for logging and matching).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Authentication(_) => "authentication",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::RateLimit { .. } => "rate_limit",
            Self::Timeout => "timeout",
            Self::UpstreamApi { .. } => "upstream_api",
            Self::Transform(_) => "transform",
            Self::Internal(_) => "internal",
        }
    }

    /// Default HTTP status for this kind (spec.md §4.8 table), unless the
    /// kind carries its own observed upstream status.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Authentication(_) => 401,
            Self::Permission(_) => 403,
            Self::NotFound(_) => 404,
            Self::RateLimit { .. } => 429,
            Self::Timeout => 408,
            Self::UpstreamApi { status, .. } => match status {
                500..=599 => *status,
                _ => 502,
            },
            Self::Transform(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Render this error as an OpenAI-dialect error body
    /// (`{"error": {"message","type","code"}}`, spec.md §4.8).
    pub fn to_openai_body(&self) -> Value {
        let (error_type, code) = match self {
            Self::Validation { .. } => ("invalid_request_error", "invalid_request_error"),
            Self::Authentication(_) => ("authentication_error", "invalid_api_key"),
            Self::Permission(_) => ("permission_error", "permission_error"),
            Self::NotFound(_) => ("invalid_request_error", "not_found"),
            Self::RateLimit { .. } => ("rate_limit_error", "rate_limit_exceeded"),
            Self::Timeout => ("timeout_error", "timeout_error"),
            Self::UpstreamApi { .. } => ("api_error", "api_error"),
            Self::Transform(_) => ("invalid_request_error", "transform_error"),
            Self::Internal(_) => ("api_error", "internal_error"),
        };

        json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": code,
                "param": Value::Null,
            }
        })
    }

    /// Render this error as a Claude-dialect error body
    /// (`{"type":"error","error":{"type","message"}}`, spec.md §4.8).
    pub fn to_claude_body(&self) -> Value {
        let error_type = match self {
            Self::Validation { .. } => "invalid_request_error",
            Self::Authentication(_) => "authentication_error",
            Self::Permission(_) => "permission_error",
            Self::NotFound(_) => "not_found_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::Timeout => "timeout_error",
            Self::UpstreamApi { .. } => "overloaded_error",
            Self::Transform(_) => "invalid_request_error",
            Self::Internal(_) => "api_error",
        };

        json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        })
    }

    /// Render this error as a Gemini-dialect passthrough error body
    /// (`{"error": {"code","message","status"}}`, spec.md §4.8).
    pub fn to_gemini_body(&self) -> Value {
        let status = match self {
            Self::Validation { .. } => "INVALID_ARGUMENT",
            Self::Authentication(_) => "UNAUTHENTICATED",
            Self::Permission(_) => "PERMISSION_DENIED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RateLimit { .. } => "RESOURCE_EXHAUSTED",
            Self::Timeout => "DEADLINE_EXCEEDED",
            Self::UpstreamApi { status, .. } if *status >= 500 => "UNAVAILABLE",
            Self::UpstreamApi { .. } => "INTERNAL",
            Self::Transform(_) => "INTERNAL",
            Self::Internal(_) => "INTERNAL",
        };

        json!({
            "error": {
                "code": self.http_status(),
                "message": self.to_string(),
                "status": status,
            }
        })
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_carries_field_path() {
        let err = LlmError::validation("messages[0].role", "unknown role");
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn openai_rendering_has_expected_shape() {
        let err = LlmError::RateLimit { message: "daily quota exceeded".to_string(), retry_after_secs: Some(3600) };
        let body = err.to_openai_body();
        assert_eq!(body["error"]["type"], "rate_limit_error");
        assert_eq!(body["error"]["code"], "rate_limit_exceeded");
    }

    #[test]
    fn claude_rendering_has_expected_shape() {
        let err = LlmError::NotFound("model not mapped".to_string());
        let body = err.to_claude_body();
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"]["type"], "not_found_error");
    }

    #[test]
    fn gemini_rendering_passes_through_status() {
        let err = LlmError::UpstreamApi { status: 503, message: "overloaded".to_string() };
        let body = err.to_gemini_body();
        assert_eq!(body["error"]["status"], "UNAVAILABLE");
    }
}
