//! Native Gemini transformer (spec.md §4.3): "Encode: strip `stream` and
//! `model` from the body, keep everything else... Decode: ...pass through
//! JSON verbatim."
//!
//! The native dialect's wire shape already *is* [`crate::upstream::UpstreamRequest`]
//! / [`crate::upstream::UpstreamResponse`] (spec.md §3: "Gemini-generate:
//! already in upstream shape"), and those types have no `stream`/`model`
//! fields to begin with — serde drops any such fields on deserialization
//! without a `deny_unknown_fields` bound, which already satisfies the
//! "strip" requirement. `model` and the streaming/unary choice are carried
//! by the request's URL path, not the body (spec.md §6).
//!
//! "Pass through JSON verbatim" on decode relies on
//! [`crate::upstream::UpstreamResponse`]'s and
//! [`crate::upstream::Candidate`]'s `unknown_fields` (`safetyRatings`,
//! `promptFeedback`, `modelVersion`, `citationMetadata`, …): this identity
//! function only round-trips what the type already captured, so every
//! dialect decodes from the same typed response and the native dialect
//! loses nothing the others don't model.

use crate::{error::Result, protocol::gemini, upstream::UpstreamRequest};

/// Validate and pass a native request through unchanged (spec.md §4.3).
pub fn encode(request: UpstreamRequest) -> Result<UpstreamRequest> {
    gemini::validate(&request)?;
    Ok(request)
}

/// Decode (unary): identity (spec.md §4.3, §8: "`decode(encode(r))`...
/// is the identity on the observable response fields").
pub fn decode<T>(response: T) -> T {
    response
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_rejects_empty_contents() {
        let request: UpstreamRequest = serde_json::from_value(json!({"contents": []})).unwrap();
        assert!(encode(request).is_err());
    }

    #[test]
    fn encode_is_identity_on_valid_request() {
        let request: UpstreamRequest = serde_json::from_value(json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
        }))
        .unwrap();
        let encoded = encode(request.clone()).unwrap();
        assert_eq!(serde_json::to_value(&encoded).unwrap(), serde_json::to_value(&request).unwrap());
    }

    #[test]
    fn decode_is_identity() {
        assert_eq!(decode(42), 42);
    }

    #[test]
    fn extra_body_fields_are_dropped_by_deserialization() {
        let request: UpstreamRequest = serde_json::from_value(json!({
            "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
            "model": "gemini-2.5-flash",
            "stream": true,
        }))
        .unwrap();
        let json = serde_json::to_value(&encode(request).unwrap()).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("stream").is_none());
    }
}
