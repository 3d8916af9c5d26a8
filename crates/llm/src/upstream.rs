//! The canonical upstream (Gemini) wire shape (spec.md §3): every dialect's
//! transformer encodes into this and decodes out of it. It is also, nearly
//! verbatim, the native Gemini dialect's own wire format (spec.md §4.3:
//! "Native transformer... keep everything else").
//!
//! Field casing follows the upstream API (`camelCase`), grounded on the
//! teacher's `provider/google/input.rs` Gemini request types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

/// `POST .../generateContent` or `:streamGenerateContent` request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRequest {
    /// Ordered conversation turns.
    pub contents: Vec<Content>,
    /// Generation knobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    /// Callable function declarations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclaration>>,
    /// Function-calling mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
    /// System prompt, folded in by each dialect's encoder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

/// One turn: a role and its ordered content parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// `user` or `model`. Absent on `systemInstruction`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Ordered parts making up this turn.
    pub parts: Vec<Part>,
}

/// The upstream's two conversational roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user / client.
    User,
    /// The model's own turn.
    Model,
}

/// One content part. `thought` distinguishes chain-of-thought text from
/// ordinary text on the decode path (spec.md §3: "plain text (no `thought`
/// marker), thought text (`thought=true`)").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Plain or thought text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set only on thought parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Inline base64 media (images).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// A model-issued tool call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// A client-supplied tool result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    /// A plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), thought: None, inline_data: None, function_call: None, function_response: None }
    }

    /// An empty part with no field set, for callers that immediately fill
    /// in exactly one of the other fields.
    pub fn empty() -> Self {
        Self { text: None, thought: None, inline_data: None, function_call: None, function_response: None }
    }

    /// Whether this part is chain-of-thought text (spec.md §3).
    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false) && self.text.is_some()
    }
}

/// Inline base64-encoded media (spec.md §4.2 multimodal processor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// Normalized MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// A model-issued function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// The called function's name.
    pub name: String,
    /// Arguments, as arbitrary JSON (spec.md §9: "dynamic JSON at the edges").
    #[serde(default)]
    pub args: Value,
}

/// A client-supplied function result, echoed back upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Which function this result answers.
    pub name: String,
    /// The result payload.
    pub response: Value,
}

/// Generation knobs (spec.md §4.2 config processor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Stop sequences, capped to 8 entries of 120 chars each (spec.md §8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Chain-of-thought controls (spec.md §4.2 thinking processor).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Chain-of-thought controls (spec.md §4.2).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Whether thought parts are emitted on the response.
    pub include_thoughts: bool,
    /// Token budget reserved for thinking, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
}

/// One callable tool's function declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// The tool's function declarations.
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// A single function's name, description, and pruned JSON-schema parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// The function's name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Pruned JSON-schema parameters object (spec.md §4.2).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Function-calling mode selection (spec.md §4.2 tools processor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// The function-calling mode knob.
    pub function_calling_config: FunctionCallingConfig,
}

/// The function-calling mode itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    /// `AUTO`, `ANY`, or `NONE`.
    pub mode: FunctionCallingMode,
    /// Restricts `ANY` mode to these function names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

/// The three upstream function-calling modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
    /// The model decides whether to call a function.
    Auto,
    /// The model must call one of the allowed functions.
    Any,
    /// The model must not call any function.
    None,
}

/// `generateContent`'s unary response body.
///
/// `unknown_fields` captures whatever this gateway doesn't model explicitly
/// (`promptFeedback`, `modelVersion`, …) so the native dialect's decode can
/// pass the upstream body through byte-preserving (spec.md §4.3: "pass
/// through JSON verbatim") while every other dialect still reads the typed
/// fields it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamResponse {
    /// Candidate completions; spec.md §4.3 treats an absent first candidate
    /// as an error.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token accounting for this call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    /// Any fields this gateway doesn't model explicitly.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

/// One candidate completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// The candidate's content parts.
    #[serde(default)]
    pub content: Content,
    /// Why generation stopped, e.g. `STOP`, `MAX_TOKENS`, `SAFETY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Any fields this gateway doesn't model explicitly (`safetyRatings`,
    /// `citationMetadata`, …).
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}

impl Default for Content {
    fn default() -> Self {
        Self { role: Some(Role::Model), parts: Vec::new() }
    }
}

/// Token counts for one call (spec.md §3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Input/prompt tokens.
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Output tokens.
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Sum of the two, when the upstream reports it.
    #[serde(default)]
    pub total_token_count: u32,
}

/// One streamed partial response: the same shape as [`UpstreamResponse`]
/// (spec.md §3: "a partial upstream response with zero or more parts added
/// to `candidates[0].content.parts`").
pub type StreamChunk = UpstreamResponse;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_minimal_request() {
        let req = UpstreamRequest {
            contents: vec![Content { role: Some(Role::User), parts: vec![Part::text("ping")] }],
            ..Default::default()
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("generationConfig"));
    }

    #[test]
    fn thought_part_is_detected() {
        let part = Part { thought: Some(true), ..Part::text("hmm") };
        assert!(part.is_thought());
        assert!(!Part::text("hmm").is_thought());
    }

    #[test]
    fn deserializes_response_with_function_call() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"functionCall": {"name": "f", "args": {"a": 1}}}]},
                "finishReason": "STOP",
            }],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 2, "totalTokenCount": 3},
        });
        let resp: UpstreamResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.candidates[0].content.parts[0].function_call.as_ref().unwrap().name, "f");
    }

    #[test]
    fn unmodeled_response_fields_round_trip() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "hi"}]},
                "finishReason": "STOP",
                "safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}],
            }],
            "promptFeedback": {"blockReason": null},
            "modelVersion": "gemini-2.5-flash-001",
        });
        let resp: UpstreamResponse = serde_json::from_value(body.clone()).unwrap();
        let round_tripped = serde_json::to_value(&resp).unwrap();
        assert_eq!(round_tripped["modelVersion"], body["modelVersion"]);
        assert_eq!(round_tripped["candidates"][0]["safetyRatings"], body["candidates"][0]["safetyRatings"]);
    }
}
