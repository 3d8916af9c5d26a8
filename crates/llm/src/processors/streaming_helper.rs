//! Streaming helper processor (spec.md §4.2): stateless constructors for
//! the Claude-stream framing events, used by the Claude streaming
//! transformer's state machine (spec.md §4.3, §9).

use serde_json::Value;

use crate::protocol::claude::{Delta, MessageDeltaPayload, MessageStartEnvelope, ResponseBlock, StreamEvent, Usage};

/// Opens the stream (spec.md §4.3 scenario 3: "`message_start`").
pub fn message_start(id: String, model: String) -> StreamEvent {
    StreamEvent::MessageStart {
        message: MessageStartEnvelope { id, kind: "message", role: "assistant", model, content: Vec::new() },
    }
}

/// A keep-alive frame, emitted once right after `message_start`.
pub fn ping() -> StreamEvent {
    StreamEvent::Ping
}

/// Opens a `text` content block at `index`.
pub fn text_block_start(index: u32) -> StreamEvent {
    StreamEvent::ContentBlockStart { index, content_block: ResponseBlock::Text { text: String::new() } }
}

/// Opens a `thinking` content block at `index`.
pub fn thinking_block_start(index: u32) -> StreamEvent {
    StreamEvent::ContentBlockStart { index, content_block: ResponseBlock::Thinking { thinking: String::new() } }
}

/// Opens a `tool_use` content block at `index`.
pub fn tool_use_block_start(index: u32, id: String, name: String) -> StreamEvent {
    StreamEvent::ContentBlockStart {
        index,
        content_block: ResponseBlock::ToolUse { id, name, input: Value::Object(Default::default()) },
    }
}

/// An incremental text delta for the block at `index`.
pub fn text_delta(index: u32, text: String) -> StreamEvent {
    StreamEvent::ContentBlockDelta { index, delta: Delta::TextDelta { text } }
}

/// An incremental thinking delta for the block at `index`.
pub fn thinking_delta(index: u32, thinking: String) -> StreamEvent {
    StreamEvent::ContentBlockDelta { index, delta: Delta::ThinkingDelta { thinking } }
}

/// An incremental partial-JSON delta for the tool_use block at `index`.
pub fn input_json_delta(index: u32, partial_json: String) -> StreamEvent {
    StreamEvent::ContentBlockDelta { index, delta: Delta::InputJsonDelta { partial_json } }
}

/// Closes the block at `index`.
pub fn block_stop(index: u32) -> StreamEvent {
    StreamEvent::ContentBlockStop { index }
}

/// Carries the final stop reason and cumulative usage.
pub fn message_delta(stop_reason: &'static str, usage: Usage) -> StreamEvent {
    StreamEvent::MessageDelta { delta: MessageDeltaPayload { stop_reason }, usage }
}

/// Closes the stream.
pub fn message_stop() -> StreamEvent {
    StreamEvent::MessageStop
}

/// An error-typed frame mid-stream (spec.md §7).
pub fn error(body: Value) -> StreamEvent {
    StreamEvent::Error { error: body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_start_has_empty_content() {
        let event = message_start("msg_1".to_string(), "claude-3-5-sonnet-20241022".to_string());
        match event {
            StreamEvent::MessageStart { message } => assert!(message.content.is_empty()),
            _ => panic!("expected MessageStart"),
        }
    }
}
