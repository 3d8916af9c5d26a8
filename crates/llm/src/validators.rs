//! Validators (spec.md §4.1): strict shape and range checks on inbound
//! requests, run before any translation. Validators never mutate; they
//! return the parsed body for downstream consumption. Every rejection
//! carries a non-empty field path (spec.md §8: "Validator totality").

use crate::{
    error::{LlmError, Result},
    protocol::{claude, openai},
};

const OPENAI_ROLES: &[&str] = &["system", "user", "assistant", "tool"];

/// Reject a request body larger than `max_bytes` before it is even decoded
/// (spec.md §4.1: "a maximum request body size before JSON decoding").
pub fn check_body_size(body_len: usize, max_bytes: usize) -> Result<()> {
    if body_len > max_bytes {
        return Err(LlmError::validation("body", format!("request body of {body_len} bytes exceeds the {max_bytes} byte limit")));
    }
    Ok(())
}

/// Validate an OpenAI chat-completions request (spec.md §4.1, §3).
pub fn validate_openai(request: &openai::ChatCompletionRequest) -> Result<()> {
    if request.messages.is_empty() {
        return Err(LlmError::validation("messages", "messages must not be empty"));
    }

    for (i, message) in request.messages.iter().enumerate() {
        if !OPENAI_ROLES.contains(&message.role.as_str()) {
            return Err(LlmError::validation(
                format!("messages[{i}].role"),
                format!("role must be one of system|user|assistant|tool, got {:?}", message.role),
            ));
        }

        if let Some(tool_calls) = &message.tool_calls {
            for (j, call) in tool_calls.iter().enumerate() {
                if call.id.is_empty() {
                    return Err(LlmError::validation(format!("messages[{i}].tool_calls[{j}].id"), "tool call id must not be empty"));
                }
                if call.function.name.is_empty() {
                    return Err(LlmError::validation(
                        format!("messages[{i}].tool_calls[{j}].function.name"),
                        "tool call function name must not be empty",
                    ));
                }
            }
        }
    }

    if let Some(temperature) = request.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(LlmError::validation("temperature", "temperature must be in [0,2]"));
    }

    if let Some(top_p) = request.top_p
        && !(0.0..=1.0).contains(&top_p)
    {
        return Err(LlmError::validation("top_p", "top_p must be in [0,1]"));
    }

    if let Some(tool_choice) = &request.tool_choice {
        validate_openai_tool_choice(tool_choice, request.tools.as_deref())?;
    }

    Ok(())
}

fn validate_openai_tool_choice(choice: &openai::ToolChoice, tools: Option<&[openai::Tool]>) -> Result<()> {
    match choice {
        openai::ToolChoice::Mode(mode) => {
            if !["none", "auto", "required"].contains(&mode.as_str()) {
                return Err(LlmError::validation("tool_choice", format!("unrecognized tool_choice mode {mode:?}")));
            }
        }
        openai::ToolChoice::Named { function } => {
            let known = tools.is_some_and(|tools| tools.iter().any(|t| t.function.name == function.name));
            if !known {
                return Err(LlmError::validation(
                    "tool_choice.function.name",
                    format!("tool_choice names {:?}, which is not in tools", function.name),
                ));
            }
        }
    }
    Ok(())
}

/// Validate a Claude messages request (spec.md §4.1, §3).
pub fn validate_claude(request: &claude::MessagesRequest) -> Result<()> {
    if request.messages.is_empty() {
        return Err(LlmError::validation("messages", "messages must not be empty"));
    }

    let mut expected = "user";
    for (i, message) in request.messages.iter().enumerate() {
        if message.role != "user" && message.role != "assistant" {
            return Err(LlmError::validation(format!("messages[{i}].role"), format!("role must be user or assistant, got {:?}", message.role)));
        }

        if message.role != expected {
            return Err(LlmError::validation(
                format!("messages[{i}].role"),
                format!("messages must strictly alternate user/assistant starting with user; expected {expected:?}"),
            ));
        }

        expected = if expected == "user" { "assistant" } else { "user" };
    }

    if let Some(temperature) = request.temperature
        && !(0.0..=1.0).contains(&temperature)
    {
        return Err(LlmError::validation("temperature", "temperature must be in [0,1]"));
    }

    if let Some(top_p) = request.top_p
        && !(0.0..=1.0).contains(&top_p)
    {
        return Err(LlmError::validation("top_p", "top_p must be in [0,1]"));
    }

    if let Some(top_k) = request.top_k
        && top_k < 1
    {
        return Err(LlmError::validation("top_k", "top_k must be >= 1"));
    }

    if let Some(tools) = &request.tools {
        for (i, tool) in tools.iter().enumerate() {
            if tool.name.is_empty() {
                return Err(LlmError::validation(format!("tools[{i}].name"), "tool name must not be empty"));
            }
        }
    }

    if let claude::ToolChoice::Tool { name } = request.tool_choice.as_ref().unwrap_or(&claude::ToolChoice::Auto) {
        let known = request.tools.as_ref().is_some_and(|tools| tools.iter().any(|t| &t.name == name));
        if !known {
            return Err(LlmError::validation("tool_choice.name", format!("tool_choice names {name:?}, which is not in tools")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejects_oversized_body() {
        assert!(check_body_size(200, 100).is_err());
        assert!(check_body_size(50, 100).is_ok());
    }

    #[test]
    fn openai_rejects_unknown_role() {
        let request: openai::ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [{"role": "weirdo", "content": "hi"}],
        }))
        .unwrap();
        let err = validate_openai(&request).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn claude_rejects_non_alternating_roles() {
        let request: claude::MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 32,
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "user", "content": "again"},
            ],
        }))
        .unwrap();
        assert!(validate_claude(&request).is_err());
    }

    #[test]
    fn claude_accepts_valid_alternation() {
        let request: claude::MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 32,
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "again"},
            ],
        }))
        .unwrap();
        assert!(validate_claude(&request).is_ok());
    }

    #[test]
    fn claude_temperature_out_of_range_rejected() {
        let request: claude::MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 32,
            "temperature": 2.0,
            "messages": [{"role": "user", "content": "hi"}],
        }))
        .unwrap();
        assert!(validate_claude(&request).is_err());
    }

    #[test]
    fn claude_tool_choice_must_name_declared_tool() {
        let request: claude::MessagesRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 32,
            "messages": [{"role": "user", "content": "hi"}],
            "tool_choice": {"type": "tool", "name": "ghost"},
        }))
        .unwrap();
        assert!(validate_claude(&request).is_err());
    }
}
