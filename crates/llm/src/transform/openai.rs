//! OpenAI transformer (spec.md §4.3): `encode`/`decode` between the OpenAI
//! chat-completions dialect and the canonical upstream shape.

use serde_json::Value;

use crate::{
    error::{LlmError, Result},
    ids,
    processors::{config as config_processor, multimodal, tools},
    protocol::openai::{
        ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Choice, ChunkChoice, ContentPart, Delta, FunctionDef, Message,
        MessageContent, ResponseMessage, Tool, ToolCall, ToolCallFunction, ToolChoice, Usage,
    },
    upstream::{Content, FunctionCall, FunctionResponse, Part, Role, UpstreamRequest, UpstreamResponse},
};

/// Encode a validated OpenAI request into the canonical upstream shape.
/// Returns the upstream request body and whether the client asked to
/// stream (spec.md §4.3).
pub fn encode(request: &ChatCompletionRequest, default_max_tokens: u32) -> Result<(UpstreamRequest, bool)> {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for message in &request.messages {
        if message.role == "system" && system_instruction.is_none() {
            system_instruction = Some(Content { role: None, parts: vec![Part::text(text_of(&message.content))] });
            continue;
        }

        let role = if message.role == "assistant" { Role::Model } else { Role::User };
        let mut parts = encode_content(&message.content);

        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                parts.push(Part {
                    function_call: Some(FunctionCall { name: call.function.name.clone(), args }),
                    ..Part::empty()
                });
            }
        }

        if message.role == "tool"
            && let Some(id) = &message.tool_call_id
        {
            parts = vec![Part {
                function_response: Some(FunctionResponse { name: id.clone(), response: json_response(&message.content) }),
                ..Part::empty()
            }];
        }

        contents.push(Content { role: Some(role), parts });
    }

    let knobs = config_processor::GenerationKnobs {
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: None,
        stop_sequences: request.stop.clone(),
    };
    let generation_config = config_processor::process(&knobs, default_max_tokens);

    let (tool_declarations, tool_config) = encode_tools(request.tools.as_deref(), request.tool_choice.as_ref());

    Ok((
        UpstreamRequest {
            contents,
            generation_config: Some(generation_config),
            tools: tool_declarations,
            tool_config,
            system_instruction,
        },
        request.stream,
    ))
}

fn text_of(content: &Option<MessageContent>) -> String {
    match content {
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

fn json_response(content: &Option<MessageContent>) -> Value {
    Value::String(text_of(content))
}

fn encode_content(content: &Option<MessageContent>) -> Vec<Part> {
    match content {
        None => Vec::new(),
        Some(MessageContent::Text(text)) => vec![Part::text(text.clone())],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => multimodal::process(&multimodal::ContentItem::Text(text.clone())),
                ContentPart::ImageUrl { image_url } => encode_image(&image_url.url),
            })
            .collect(),
    }
}

fn encode_image(url: &str) -> Part {
    if let Some(rest) = url.strip_prefix("data:") {
        let media_type = rest.split(';').next().unwrap_or("image/jpeg").to_string();
        return multimodal::process(&multimodal::ContentItem::InlineImage { media_type, data: rest.to_string() });
    }
    multimodal::process(&multimodal::ContentItem::RemoteImage { url: url.to_string() })
}

fn encode_tools(tools_in: Option<&[Tool]>, choice: Option<&ToolChoice>) -> (Option<Vec<crate::upstream::ToolDeclaration>>, Option<crate::upstream::ToolConfig>) {
    let declarations: Vec<_> = tools_in
        .unwrap_or(&[])
        .iter()
        .map(|t| tools::declaration_for(&to_tool_spec(&t.function), None))
        .collect();

    let choice_spec = choice.map(|c| match c {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "none" => tools::ToolChoiceSpec::None,
            "required" => tools::ToolChoiceSpec::Any,
            _ => tools::ToolChoiceSpec::Auto,
        },
        ToolChoice::Named { function } => tools::ToolChoiceSpec::Named(function.name.clone()),
    });

    tools::process(&declarations, choice_spec)
}

fn to_tool_spec(def: &FunctionDef) -> tools::ToolSpec {
    tools::ToolSpec { name: def.name.clone(), description: def.description.clone(), parameters: def.parameters.clone() }
}

/// Decode a unary upstream response into the OpenAI dialect (spec.md
/// §4.3).
pub fn decode(response: &UpstreamResponse, client_model: &str) -> Result<ChatCompletionResponse> {
    let candidate = response.candidates.first().ok_or_else(|| LlmError::Transform("upstream response has no candidates".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in &candidate.content.parts {
        if let Some(t) = &part.text
            && !part.is_thought()
        {
            text.push_str(t);
        }
        if let Some(call) = &part.function_call {
            tool_calls.push(ToolCall {
                id: ids::openai_tool_call_id(tool_calls.len()),
                kind: "function".to_string(),
                function: ToolCallFunction { name: call.name.clone(), arguments: call.args.to_string() },
            });
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        "tool_calls".to_string()
    } else {
        map_finish_reason(candidate.finish_reason.as_deref())
    };

    let usage = response.usage_metadata.unwrap_or_default();

    Ok(ChatCompletionResponse {
        model: client_model.to_string(),
        object: "chat.completion",
        created: unix_seconds(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant",
                content: (!text.is_empty()).then_some(text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason,
        }],
        usage: Usage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
    })
}

fn map_finish_reason(reason: Option<&str>) -> String {
    match reason {
        Some("STOP") | None => "stop",
        Some("MAX_TOKENS") => "length",
        Some("SAFETY") | Some("RECITATION") => "content_filter",
        Some(_) => "stop",
    }
    .to_string()
}

/// Decode one streamed upstream chunk into zero or more OpenAI SSE frames
/// (spec.md §4.3: "Decode (streaming)"). Returns the serialized `data:`
/// lines, already including the terminal `[DONE]` marker when this chunk
/// carries a `finishReason`.
pub fn decode_stream_chunk(chunk: &UpstreamResponse, client_model: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let Some(candidate) = chunk.candidates.first() else {
        return frames;
    };

    let mut text = String::new();
    for part in &candidate.content.parts {
        if let Some(t) = &part.text
            && !part.is_thought()
        {
            text.push_str(t);
        }
    }

    if !text.is_empty() {
        frames.push(sse_frame(&ChatCompletionChunk {
            model: client_model.to_string(),
            object: "chat.completion.chunk",
            created: unix_seconds(),
            choices: vec![ChunkChoice { index: 0, delta: Delta { content: Some(text) }, finish_reason: None }],
        }));
    }

    if let Some(reason) = &candidate.finish_reason {
        frames.push(sse_frame(&ChatCompletionChunk {
            model: client_model.to_string(),
            object: "chat.completion.chunk",
            created: unix_seconds(),
            choices: vec![ChunkChoice { index: 0, delta: Delta::default(), finish_reason: Some(map_finish_reason(Some(reason))) }],
        }));
        frames.push("[DONE]".to_string());
    }

    frames
}

fn sse_frame<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn unix_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request() -> ChatCompletionRequest {
        serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "ping"}],
        }))
        .unwrap()
    }

    #[test]
    fn encode_extracts_system_message() {
        let mut request = request();
        request.messages.insert(0, Message { role: "system".to_string(), content: Some(MessageContent::Text("be nice".to_string())), tool_calls: None, tool_call_id: None });
        let (upstream, streaming) = encode(&request, 1024).unwrap();
        assert!(!streaming);
        assert_eq!(upstream.system_instruction.unwrap().parts[0].text.as_deref(), Some("be nice"));
        assert_eq!(upstream.contents.len(), 1);
    }

    #[test]
    fn decode_maps_tool_call_to_openai_shape() {
        let response: UpstreamResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"functionCall": {"name": "get_weather", "args": {"location": "Boston, MA"}}}]},
                "finishReason": "STOP",
            }],
        }))
        .unwrap();

        let decoded = decode(&response, "gpt-4o").unwrap();
        assert_eq!(decoded.choices[0].finish_reason, "tool_calls");
        let tool_calls = decoded.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "get_weather");
        assert!(tool_calls[0].function.arguments.contains("Boston"));
    }

    #[test]
    fn decode_maps_finish_reasons() {
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), "length");
        assert_eq!(map_finish_reason(Some("SAFETY")), "content_filter");
        assert_eq!(map_finish_reason(Some("STOP")), "stop");
        assert_eq!(map_finish_reason(Some("WEIRD")), "stop");
    }

    #[test]
    fn decode_stream_chunk_emits_done_on_finish() {
        let chunk: UpstreamResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP"}],
        }))
        .unwrap();
        let frames = decode_stream_chunk(&chunk, "gpt-4o");
        assert_eq!(frames.last().unwrap(), "[DONE]");
    }

    #[test]
    fn decode_errors_on_missing_candidates() {
        let response = UpstreamResponse::default();
        assert!(decode(&response, "gpt-4o").is_err());
    }
}
