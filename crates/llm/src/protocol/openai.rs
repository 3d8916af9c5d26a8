//! The OpenAI chat-completions dialect's wire types (spec.md §3, §4.1, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Client-facing model name, resolved via the model-mapping table.
    pub model: String,
    /// Ordered messages; may interleave roles and include a leading `system`.
    pub messages: Vec<Message>,
    /// Sampling temperature, accepted in `[0,2]` (spec.md §3).
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold, `[0,1]`.
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<i64>,
    /// Tool/function declarations available to the model.
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,
    /// Tool choice directive.
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response as SSE chunks.
    #[serde(default)]
    pub stream: bool,
}

/// One chat message. `role` is validated against the closed set in
/// spec.md §4.1.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// `system`, `user`, `assistant`, or `tool`.
    pub role: String,
    /// Text or multimodal content; absent on a pure tool-call assistant turn.
    #[serde(default)]
    pub content: Option<MessageContent>,
    /// Tool calls issued by the assistant in this turn.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// The tool-result id this message answers, when `role == "tool"`.
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// A message's content: either a plain string, or an ordered array of
/// multimodal parts (spec.md §4.2 multimodal processor).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Ordered text/image parts.
    Parts(Vec<ContentPart>),
}

/// One multimodal content part.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image, given as a (possibly data:) URL.
    ImageUrl {
        /// The image URL payload.
        image_url: ImageUrl,
    },
}

/// An OpenAI-style `image_url` content part payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrl {
    /// A `data:<mime>;base64,<data>` URL, or an `http(s)://` URL (rejected
    /// by the multimodal processor, spec.md §4.2).
    pub url: String,
}

/// A tool/function declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct Tool {
    /// Always `"function"` in this dialect.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function's name, description, and JSON-schema parameters.
    pub function: FunctionDef,
}

/// A declared function's shape.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDef {
    /// The function's name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-schema parameters object, pruned before reaching upstream.
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// A model-issued tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Synthetic id, `call_<ts>_<i>` (spec.md §4.3).
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The called function and its JSON-encoded arguments.
    pub function: ToolCallFunction,
}

/// A tool call's function name and arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    /// The function's name.
    pub name: String,
    /// JSON-encoded argument object (a string, not a nested value, per the
    /// OpenAI wire format).
    pub arguments: String,
}

/// Tool-choice directive (spec.md §4.1, §4.2).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"none" | "auto" | "required"`.
    Mode(String),
    /// `{"type":"function","function":{"name":...}}`.
    Named {
        /// The named function to force.
        function: ToolChoiceFunction,
    },
}

/// The named-function form of [`ToolChoice`].
#[derive(Debug, Clone, Deserialize)]
pub struct ToolChoiceFunction {
    /// The function's name; must exist in the request's `tools`.
    pub name: String,
}

/// `chat.completion` unary response body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    /// Echoes the client's model name (spec.md §8 round-trip invariant).
    pub model: String,
    /// Always `"chat.completion"`.
    pub object: &'static str,
    /// Unix-seconds creation timestamp.
    pub created: i64,
    /// Exactly one choice (the gateway does not support `n > 1`).
    pub choices: Vec<Choice>,
    /// Token accounting.
    pub usage: Usage,
}

/// One completion choice.
#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    /// Always 0.
    pub index: u32,
    /// The assistant's message.
    pub message: ResponseMessage,
    /// `stop`, `length`, `content_filter`, or `tool_calls` (spec.md §4.3).
    pub finish_reason: String,
}

/// The assistant's response message.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    /// Always `"assistant"`.
    pub role: &'static str,
    /// Text content, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Token usage for a unary response.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Usage {
    /// Input tokens.
    pub prompt_tokens: u32,
    /// Output tokens.
    pub completion_tokens: u32,
    /// Sum of the two.
    pub total_tokens: u32,
}

/// `chat.completion.chunk` streaming frame.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    /// Echoes the client's model name.
    pub model: String,
    /// Always `"chat.completion.chunk"`.
    pub object: &'static str,
    /// Unix-seconds creation timestamp.
    pub created: i64,
    /// Exactly one choice.
    pub choices: Vec<ChunkChoice>,
}

/// One streaming chunk's choice.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    /// Always 0.
    pub index: u32,
    /// The incremental content.
    pub delta: Delta,
    /// Set only on the final chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// An incremental delta in a streaming chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    /// Incremental text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// `GET /v1/models` list entry, unused by the core adapters but kept for
/// completeness of the dialect's surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The model id.
    pub id: String,
    /// Always `"model"`.
    pub object: &'static str,
    /// Any fields this gateway doesn't model explicitly.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}
