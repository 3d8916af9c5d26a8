//! Synthetic id generation for tool calls and messages (spec.md §4.3).

use std::time::{SystemTime, UNIX_EPOCH};

fn unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}

/// An OpenAI tool-call id: `call_<ts>_<i>` (spec.md §4.3).
pub fn openai_tool_call_id(index: usize) -> String {
    format!("call_{}_{index}", unix_millis())
}

/// A Claude tool-use id: `toolu_<uuid>` (spec.md §8 scenario 2 analog).
pub fn claude_tool_use_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

/// A Claude message id: `msg_<uuid>`.
pub fn claude_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// A client-correlation request id, echoed as `x-request-id` (spec.md §7).
pub fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
