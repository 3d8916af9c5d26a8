//! Claude transformer (spec.md §4.3): `encode`/`decode` between the Claude
//! messages dialect and the canonical upstream shape, including the
//! explicit streaming state machine (spec.md §9).

use crate::{
    error::{LlmError, Result},
    ids,
    processors::{config as config_processor, multimodal, streaming_helper, thinking, tools},
    protocol::claude::{
        ContentBlock, MessageContent, MessagesRequest, MessagesResponse, ResponseBlock, StreamEvent, Tool, ToolChoice, Usage,
    },
    upstream::{Content, FunctionCall, FunctionResponse, Part, Role, UpstreamRequest, UpstreamResponse},
};

/// Encode a validated Claude request into the canonical upstream shape.
/// Folds `system` into the first user message (spec.md §4.3).
pub fn encode(request: &MessagesRequest, default_max_tokens: u32, model_supports_thinking: bool) -> Result<(UpstreamRequest, bool)> {
    let mut contents = Vec::with_capacity(request.messages.len());
    let system_text = request.system.as_ref().map(crate::protocol::claude::SystemPrompt::as_text);

    for (i, message) in request.messages.iter().enumerate() {
        let role = if message.role == "assistant" { Role::Model } else { Role::User };
        let mut parts = encode_content(&message.content);

        if i == 0
            && role == Role::User
            && let Some(system_text) = &system_text
        {
            let folded = format!("{system_text}\n\n{}", text_of_parts(&parts));
            parts = vec![Part::text(folded)];
        }

        contents.push(Content { role: Some(role), parts });
    }

    let knobs = config_processor::GenerationKnobs {
        max_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        stop_sequences: request.stop_sequences.clone(),
    };
    let mut generation_config = config_processor::process(&knobs, default_max_tokens);

    let max_output_tokens = generation_config.max_output_tokens.unwrap_or(default_max_tokens);
    generation_config.thinking_config = thinking::process(request.thinking.as_ref(), model_supports_thinking, max_output_tokens);

    let (tool_declarations, tool_config) = encode_tools(request.tools.as_deref(), request.tool_choice.as_ref());

    Ok((
        UpstreamRequest {
            contents,
            generation_config: Some(generation_config),
            tools: tool_declarations,
            tool_config,
            system_instruction: None,
        },
        request.stream,
    ))
}

fn encode_content(content: &MessageContent) -> Vec<Part> {
    match content {
        MessageContent::Text(text) => vec![Part::text(text.clone())],
        MessageContent::Blocks(blocks) => blocks.iter().map(encode_block).collect(),
    }
}

fn encode_block(block: &ContentBlock) -> Part {
    match block {
        ContentBlock::Text { text } => multimodal::process(&multimodal::ContentItem::Text(text.clone())),
        ContentBlock::Image { source } => {
            multimodal::process(&multimodal::ContentItem::InlineImage { media_type: source.media_type.clone(), data: source.data.clone() })
        }
        ContentBlock::ToolUse { name, input, .. } => {
            Part { function_call: Some(FunctionCall { name: name.clone(), args: input.clone() }), ..Part::empty() }
        }
        ContentBlock::ToolResult { tool_use_id, content, .. } => {
            let text = content.as_ref().map(|c| c.as_text()).unwrap_or_default();
            Part {
                function_response: Some(FunctionResponse { name: tool_use_id.clone(), response: serde_json::Value::String(text) }),
                ..Part::empty()
            }
        }
        ContentBlock::Thinking { thinking } => Part { thought: Some(true), ..Part::text(thinking.clone()) },
        ContentBlock::Unknown => Part::text(String::new()),
    }
}

fn text_of_parts(parts: &[Part]) -> String {
    parts.iter().filter_map(|p| p.text.as_deref()).collect::<Vec<_>>().join("\n")
}

fn encode_tools(tools_in: Option<&[Tool]>, choice: Option<&ToolChoice>) -> (Option<Vec<crate::upstream::ToolDeclaration>>, Option<crate::upstream::ToolConfig>) {
    let declarations: Vec<_> = tools_in
        .unwrap_or(&[])
        .iter()
        .map(|t| {
            let spec = tools::ToolSpec { name: t.name.clone(), description: t.description.clone(), parameters: t.input_schema.clone() };
            tools::declaration_for(&spec, t.kind.as_deref())
        })
        .collect();

    let choice_spec = choice.map(|c| match c {
        ToolChoice::Auto => tools::ToolChoiceSpec::Auto,
        ToolChoice::Any => tools::ToolChoiceSpec::Any,
        ToolChoice::None => tools::ToolChoiceSpec::None,
        ToolChoice::Tool { name } => tools::ToolChoiceSpec::Named(name.clone()),
    });

    tools::process(&declarations, choice_spec)
}

/// Decode a unary upstream response into the Claude dialect (spec.md
/// §4.3). `thinking_enabled` gates whether thought parts are rendered.
pub fn decode(response: &UpstreamResponse, client_model: &str, thinking_enabled: bool) -> Result<MessagesResponse> {
    let candidate = response.candidates.first().ok_or_else(|| LlmError::Transform("upstream response has no candidates".to_string()))?;

    let mut content = Vec::new();
    for part in &candidate.content.parts {
        if let Some(call) = &part.function_call {
            content.push(ResponseBlock::ToolUse { id: ids::claude_tool_use_id(), name: call.name.clone(), input: call.args.clone() });
            continue;
        }
        if let Some(text) = &part.text {
            if part.is_thought() {
                if thinking_enabled {
                    content.push(ResponseBlock::Thinking { thinking: text.clone() });
                }
                continue;
            }
            content.push(ResponseBlock::Text { text: text.clone() });
        }
    }

    if content.is_empty() {
        content.push(ResponseBlock::Text { text: String::new() });
    }

    let has_tool_use = content.iter().any(|b| matches!(b, ResponseBlock::ToolUse { .. }));
    let stop_reason = if has_tool_use { "tool_use" } else { map_stop_reason(candidate.finish_reason.as_deref()) };

    let usage = response.usage_metadata.unwrap_or_default();

    Ok(MessagesResponse {
        id: ids::claude_message_id(),
        kind: "message",
        role: "assistant",
        model: client_model.to_string(),
        content,
        stop_reason,
        usage: Usage { input_tokens: usage.prompt_token_count, output_tokens: usage.candidates_token_count },
    })
}

fn map_stop_reason(reason: Option<&str>) -> &'static str {
    match reason {
        Some("MAX_TOKENS") => "max_tokens",
        Some("TOOL_CALL") => "tool_use",
        Some("STOP") | Some("SAFETY") | Some("RECITATION") | None => "end_turn",
        Some(_) => "end_turn",
    }
}

/// The explicit streaming state machine (spec.md §9: "states `{start,
/// between-blocks, inside-block(kind, index), closing}`").
#[derive(Debug)]
pub struct StreamDecoder {
    model: String,
    thinking_enabled: bool,
    started: bool,
    next_index: u32,
    current: Option<OpenBlock>,
    any_tool_use: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    kind: BlockKind,
    index: u32,
}

impl StreamDecoder {
    /// Start a new stream for `model`.
    pub fn new(model: String, thinking_enabled: bool) -> Self {
        Self { model, thinking_enabled, started: false, next_index: 0, current: None, any_tool_use: false }
    }

    /// Feed one upstream SSE chunk (incremental parts only), returning the
    /// client-dialect events it produces, in order (spec.md §5: "emit
    /// frames to the client in arrival order").
    pub fn feed(&mut self, chunk: &UpstreamResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(streaming_helper::message_start(ids::claude_message_id(), self.model.clone()));
            events.push(streaming_helper::ping());
        }

        let Some(candidate) = chunk.candidates.first() else {
            return events;
        };

        for part in &candidate.content.parts {
            if let Some(call) = &part.function_call {
                self.close_current(&mut events);
                let index = self.allocate_index();
                let id = ids::claude_tool_use_id();
                events.push(streaming_helper::tool_use_block_start(index, id, call.name.clone()));
                events.push(streaming_helper::input_json_delta(index, call.args.to_string()));
                events.push(streaming_helper::block_stop(index));
                self.any_tool_use = true;
                continue;
            }

            let Some(text) = &part.text else { continue };
            let is_thought = part.is_thought();
            if is_thought && !self.thinking_enabled {
                continue;
            }

            let kind = if is_thought { BlockKind::Thinking } else { BlockKind::Text };
            let continues = self.current.is_some_and(|open| open.kind == kind);

            if !continues {
                self.close_current(&mut events);
                let index = self.allocate_index();
                events.push(if is_thought {
                    streaming_helper::thinking_block_start(index)
                } else {
                    streaming_helper::text_block_start(index)
                });
                self.current = Some(OpenBlock { kind, index });
            }

            let index = self.current.expect("set just above").index;
            events.push(if is_thought {
                streaming_helper::thinking_delta(index, text.clone())
            } else {
                streaming_helper::text_delta(index, text.clone())
            });
        }

        events
    }

    /// Close the stream: emits the closing block stop (if any), the final
    /// `message_delta`, and `message_stop` (spec.md §4.3, §9).
    pub fn finish(&mut self, finish_reason: Option<&str>, usage: Usage) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_current(&mut events);

        let stop_reason = if self.any_tool_use { "tool_use" } else { map_stop_reason(finish_reason) };
        events.push(streaming_helper::message_delta(stop_reason, usage));
        events.push(streaming_helper::message_stop());
        events
    }

    fn close_current(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(open) = self.current.take() {
            events.push(streaming_helper::block_stop(open.index));
        }
    }

    fn allocate_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_folds_system_into_first_user_message() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 32,
            "system": "be nice",
            "messages": [{"role": "user", "content": "ping"}],
        }))
        .unwrap();

        let (upstream, _) = encode(&request, 1024, false).unwrap();
        let text = upstream.contents[0].parts[0].text.as_deref().unwrap();
        assert!(text.starts_with("be nice\n\nping"));
    }

    #[test]
    fn encode_omits_thinking_config_when_model_unsupported() {
        let request: MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "thinking": {"type": "enabled", "budget_tokens": 512},
            "messages": [{"role": "user", "content": "ping"}],
        }))
        .unwrap();

        let (upstream, _) = encode(&request, 1024, false).unwrap();
        let config = upstream.generation_config.unwrap().thinking_config.unwrap();
        assert!(!config.include_thoughts);
    }

    #[test]
    fn decode_unary_happy_path() {
        let response: UpstreamResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "pong"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1, "totalTokenCount": 2},
        }))
        .unwrap();

        let decoded = decode(&response, "claude-3-5-sonnet-20241022", false).unwrap();
        assert_eq!(decoded.stop_reason, "end_turn");
        match &decoded.content[0] {
            ResponseBlock::Text { text } => assert_eq!(text, "pong"),
            _ => panic!("expected text block"),
        }
    }

    #[test]
    fn decode_suppresses_thoughts_when_disabled() {
        let response: UpstreamResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "secret reasoning", "thought": true},
                {"text": "answer"},
            ]}, "finishReason": "STOP"}],
        }))
        .unwrap();

        let decoded = decode(&response, "claude-3-5-sonnet-20241022", false).unwrap();
        assert_eq!(decoded.content.len(), 1);
    }

    #[test]
    fn streaming_scenario_thinking_then_text_then_stop() {
        let mut decoder = StreamDecoder::new("claude-3-5-sonnet-20250219".to_string(), true);

        let frame1: UpstreamResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": [{"text": "hmm", "thought": true}]}}]})).unwrap();
        let frame2: UpstreamResponse = serde_json::from_value(json!({"candidates": [{"content": {"parts": [{"text": "pong"}]}}]})).unwrap();

        let events1 = decoder.feed(&frame1);
        let events2 = decoder.feed(&frame2);
        let events3 = decoder.finish(Some("STOP"), Usage { input_tokens: 1, output_tokens: 1 });

        let kinds: Vec<&str> = events1
            .iter()
            .chain(&events2)
            .chain(&events3)
            .map(|e| match e {
                StreamEvent::MessageStart { .. } => "message_start",
                StreamEvent::Ping => "ping",
                StreamEvent::ContentBlockStart { .. } => "content_block_start",
                StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
                StreamEvent::ContentBlockStop { .. } => "content_block_stop",
                StreamEvent::MessageDelta { .. } => "message_delta",
                StreamEvent::MessageStop => "message_stop",
                StreamEvent::Error { .. } => "error",
                StreamEvent::Unknown => "unknown",
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                "message_start",
                "ping",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn decode_errors_on_missing_candidates() {
        let response = UpstreamResponse::default();
        assert!(decode(&response, "claude-3-5-sonnet-20241022", false).is_err());
    }
}
