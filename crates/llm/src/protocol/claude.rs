//! The Claude messages dialect's wire types (spec.md §3, §4.1, §4.2, §4.3),
//! trimmed from the teacher's `protocol/anthropic/messages/*` down to the
//! block and event kinds this gateway actually translates (text, image,
//! tool_use, tool_result, thinking).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::unknown_fields::UnknownFields;

/// `POST /v1/messages` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    /// Client-facing model name.
    pub model: String,
    /// Strictly alternating `user`/`assistant` turns (spec.md §3).
    pub messages: Vec<Message>,
    /// Required; non-positive values are treated as unset (spec.md §4.1).
    pub max_tokens: i64,
    /// Optional system prompt.
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    /// Sampling temperature, accepted in `[0,1]` (spec.md §3).
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Top-k sampling count, `>= 1`.
    #[serde(default)]
    pub top_k: Option<i64>,
    /// Stop sequences.
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Tool declarations.
    #[serde(default)]
    pub tools: Option<Vec<Tool>>,
    /// Tool-choice directive.
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    /// Chain-of-thought controls.
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,
    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
}

/// The system prompt: a bare string or a list of text blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// A plain string.
    Text(String),
    /// An ordered list of text blocks, concatenated.
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Flatten to a single string for folding into the first user turn
    /// (spec.md §4.3: Claude transformer encode).
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n"),
        }
    }
}

/// One block of a [`SystemPrompt::Blocks`] list.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemBlock {
    /// The block's text.
    pub text: String,
}

/// One conversation turn.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// `user` or `assistant`.
    pub role: String,
    /// A plain string, or an ordered list of content blocks.
    pub content: MessageContent,
}

/// A message's content: plain text or an ordered block list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text, equivalent to a single text block.
    Text(String),
    /// Ordered content blocks.
    Blocks(Vec<ContentBlock>),
}

/// One inbound content block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An inline base64 image.
    Image {
        /// The image payload.
        source: ImageSource,
    },
    /// A tool call issued by a prior assistant turn, echoed back.
    ToolUse {
        /// The call's id.
        id: String,
        /// The called tool's name.
        name: String,
        /// The call's input.
        input: Value,
    },
    /// A tool result supplied by the client, answering a prior `tool_use`.
    ToolResult {
        /// The id of the `tool_use` this answers.
        tool_use_id: String,
        /// The result content: plain text or nested blocks.
        #[serde(default)]
        content: Option<ToolResultContent>,
        /// Whether the tool call itself errored.
        #[serde(default)]
        is_error: bool,
    },
    /// Chain-of-thought content echoed back on a subsequent turn.
    Thinking {
        /// The thinking text.
        thinking: String,
    },
    /// Anything this gateway doesn't model explicitly.
    #[serde(other)]
    Unknown,
}

/// A tool result's content: plain text or nested text blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Plain text.
    Text(String),
    /// Ordered text blocks, concatenated.
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Flatten to a single string for folding into a `functionResponse`.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// An inline base64 image source.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSource {
    /// Always `"base64"` for inline images.
    #[serde(rename = "type")]
    pub kind: String,
    /// The declared MIME type.
    pub media_type: String,
    /// The base64-encoded bytes.
    pub data: String,
}

/// Chain-of-thought configuration (spec.md §4.2 thinking processor).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    /// Thinking enabled, with an optional client-requested token budget.
    Enabled {
        /// The requested budget, clamped by the thinking processor.
        #[serde(default)]
        budget_tokens: Option<u32>,
    },
    /// Thinking explicitly disabled.
    Disabled,
}

/// A tool declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct Tool {
    /// The tool's name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-schema input parameters, pruned before reaching upstream.
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// Set to a built-in tool type (`bash_*`, `text_editor_*`) instead of
    /// `"custom"` for Claude's built-in tools (spec.md §4.2 tools
    /// processor: "Recognizes Claude's built-in tool types").
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Tool-choice directive (spec.md §4.1, §4.2).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    Auto,
    /// The model must call some tool.
    Any,
    /// The model must call the named tool.
    Tool {
        /// The forced tool's name; must exist in the request's `tools`.
        name: String,
    },
    /// The model must not call any tool.
    None,
}

/// `message` unary response body.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    /// A generated id, `msg_<...>`.
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Always `"assistant"`.
    pub role: &'static str,
    /// Echoes the client's model name.
    pub model: String,
    /// Ordered response content blocks.
    pub content: Vec<ResponseBlock>,
    /// Why generation stopped.
    pub stop_reason: &'static str,
    /// Token accounting.
    pub usage: Usage,
}

/// One outbound content block.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Chain-of-thought text, emitted only when thinking was requested.
    Thinking {
        /// The thinking text.
        thinking: String,
    },
    /// A tool call the model issued.
    ToolUse {
        /// A generated id, `toolu_<...>`.
        id: String,
        /// The called tool's name.
        name: String,
        /// The call's input.
        input: Value,
    },
}

/// Token usage for a unary response.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Usage {
    /// Input tokens.
    pub input_tokens: u32,
    /// Output tokens.
    pub output_tokens: u32,
}

/// A Claude SSE streaming event (spec.md §4.3 streaming decode, §9
/// "explicit state machine"). Grounded on the teacher's
/// `protocol/anthropic/messages/sse.rs` tagged-enum shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Opens the stream; echoes id/model/role.
    MessageStart {
        /// The in-progress message envelope.
        message: MessageStartEnvelope,
    },
    /// Keep-alive; carries no data.
    Ping,
    /// Opens a content block at `index`.
    ContentBlockStart {
        /// The block's position in `content[]`.
        index: u32,
        /// The block's initial (empty) shape.
        content_block: ResponseBlock,
    },
    /// An incremental update to the block at `index`.
    ContentBlockDelta {
        /// The block's position in `content[]`.
        index: u32,
        /// The incremental delta.
        delta: Delta,
    },
    /// Closes the block at `index`.
    ContentBlockStop {
        /// The block's position in `content[]`.
        index: u32,
    },
    /// Carries the final stop reason and usage.
    MessageDelta {
        /// The final-state delta.
        delta: MessageDeltaPayload,
        /// Cumulative usage at stream end.
        usage: Usage,
    },
    /// Closes the stream.
    MessageStop,
    /// An error mid-stream (spec.md §7: "delivered as an error-typed frame
    /// within the ongoing stream").
    Error {
        /// The error body in this dialect's error shape.
        error: Value,
    },
    /// A malformed or unrecognized frame, logged and skipped.
    #[serde(other)]
    Unknown,
}

/// The `message_start` event's envelope.
#[derive(Debug, Clone, Serialize)]
pub struct MessageStartEnvelope {
    /// A generated id.
    pub id: String,
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Always `"assistant"`.
    pub role: &'static str,
    /// Echoes the client's model name.
    pub model: String,
    /// Always empty at stream start.
    pub content: Vec<ResponseBlock>,
}

/// A `content_block_delta`'s incremental payload, tagged by the block kind
/// it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// An incremental text chunk for a `text` block.
    TextDelta {
        /// The incremental text.
        text: String,
    },
    /// An incremental text chunk for a `thinking` block.
    ThinkingDelta {
        /// The incremental thinking text.
        thinking: String,
    },
    /// An incremental JSON-fragment chunk for a `tool_use` block's input.
    InputJsonDelta {
        /// The incremental partial JSON text.
        partial_json: String,
    },
}

/// The `message_delta` event's final-state payload.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDeltaPayload {
    /// Why generation stopped.
    pub stop_reason: &'static str,
}

/// `GET /v1/models` entry; kept for dialect-surface completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The model id.
    pub id: String,
    /// Any fields this gateway doesn't model explicitly.
    #[serde(flatten)]
    pub unknown_fields: UnknownFields,
}
