//! The native Gemini dialect (spec.md §3: "already in upstream shape").
//!
//! The native transformer's encode/decode is a near-identity on
//! [`crate::upstream::UpstreamRequest`]/[`crate::upstream::UpstreamResponse`];
//! this module only adds the one shape check spec.md §4.1 requires
//! (`contents` non-empty) plus the model-id path parameter the other two
//! dialects carry in the JSON body instead of the URL.

use crate::{error::LlmError, upstream::UpstreamRequest};

/// Validate a native Gemini request body (spec.md §4.1: "Gemini: `contents`
/// non-empty; pass-through otherwise").
pub fn validate(request: &UpstreamRequest) -> crate::error::Result<()> {
    if request.contents.is_empty() {
        return Err(LlmError::validation("contents", "contents must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_contents() {
        let req = UpstreamRequest::default();
        assert!(validate(&req).is_err());
    }
}
