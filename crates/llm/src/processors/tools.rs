//! Tools processor (spec.md §4.2): dialect tool declarations + tool choice
//! → upstream `tools.functionDeclarations[]` and `toolConfig`.

use serde_json::{Map, Value, json};

use crate::upstream::{FunctionCallingConfig, FunctionCallingMode, FunctionDeclaration, ToolConfig, ToolDeclaration};

/// A dialect-neutral tool declaration, built by each transformer's encode
/// step from its own wire shape.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// The tool's name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Raw JSON-schema parameters, pruned here before reaching upstream.
    pub parameters: Option<Value>,
}

/// A dialect-neutral tool-choice directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoiceSpec {
    /// The model decides.
    Auto,
    /// The model must not call a tool.
    None,
    /// The model must call some tool.
    Any,
    /// The model must call the named tool.
    Named(String),
}

/// JSON-schema keys the upstream rejects and that the pruner strips
/// recursively (spec.md §4.2).
const REJECTED_SCHEMA_KEYS: &[&str] = &["additionalProperties", "$schema", "strict", "default"];

/// Recursively prune a JSON-schema object of keys the upstream rejects.
/// Idempotent: pruning a pruned schema is a no-op (spec.md §8).
pub fn prune_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pruned = Map::new();
            for (key, val) in map {
                if REJECTED_SCHEMA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if key == "format" {
                    match val.as_str() {
                        Some("enum") | Some("date-time") => {
                            pruned.insert(key.clone(), val.clone());
                        }
                        _ => {}
                    }
                    continue;
                }
                pruned.insert(key.clone(), prune_schema(val));
            }
            Value::Object(pruned)
        }
        Value::Array(items) => Value::Array(items.iter().map(prune_schema).collect()),
        other => other.clone(),
    }
}

/// Claude's built-in tool types rewritten to fixed function declarations
/// (spec.md §4.2: "rewrites them to named function declarations with fixed
/// parameter schemas").
fn built_in_declaration(kind: &str) -> Option<FunctionDeclaration> {
    if kind.starts_with("bash_") {
        return Some(FunctionDeclaration {
            name: "bash".to_string(),
            description: Some("Run a shell command and return its output.".to_string()),
            parameters: Some(json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"],
            })),
        });
    }

    if kind.starts_with("text_editor_") {
        return Some(FunctionDeclaration {
            name: "str_replace_editor".to_string(),
            description: Some("View, create, and edit text files.".to_string()),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "enum": ["view", "create", "str_replace"]},
                    "path": {"type": "string"},
                },
                "required": ["command", "path"],
            })),
        });
    }

    None
}

/// Translate tool declarations built by a built-in kind tag, falling back
/// to a plain pruned function declaration for custom tools.
pub fn declaration_for(spec: &ToolSpec, built_in_kind: Option<&str>) -> FunctionDeclaration {
    if let Some(kind) = built_in_kind.filter(|k| *k != "custom")
        && let Some(decl) = built_in_declaration(kind)
    {
        return decl;
    }

    FunctionDeclaration {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: spec.parameters.as_ref().map(prune_schema),
    }
}

/// Build the upstream `tools`/`toolConfig` pair from a dialect-neutral tool
/// list and choice directive (spec.md §4.2).
pub fn process(
    tools: &[FunctionDeclaration],
    choice: Option<ToolChoiceSpec>,
) -> (Option<Vec<ToolDeclaration>>, Option<ToolConfig>) {
    if tools.is_empty() {
        return (None, None);
    }

    let declarations = Some(vec![ToolDeclaration { function_declarations: tools.to_vec() }]);

    let tool_config = match choice.unwrap_or(ToolChoiceSpec::Auto) {
        ToolChoiceSpec::Auto => ToolConfig {
            function_calling_config: FunctionCallingConfig { mode: FunctionCallingMode::Auto, allowed_function_names: None },
        },
        ToolChoiceSpec::None => ToolConfig {
            function_calling_config: FunctionCallingConfig { mode: FunctionCallingMode::None, allowed_function_names: None },
        },
        ToolChoiceSpec::Any => ToolConfig {
            function_calling_config: FunctionCallingConfig { mode: FunctionCallingMode::Any, allowed_function_names: None },
        },
        ToolChoiceSpec::Named(name) => ToolConfig {
            function_calling_config: FunctionCallingConfig { mode: FunctionCallingMode::Any, allowed_function_names: Some(vec![name]) },
        },
    };

    (declarations, Some(tool_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prunes_rejected_keys_recursively() {
        let schema = json!({
            "type": "object",
            "additionalProperties": false,
            "$schema": "http://json-schema.org/draft-07/schema#",
            "properties": {
                "x": {"type": "string", "format": "email", "default": "a"},
                "y": {"type": "string", "format": "enum"},
            },
        });
        let pruned = prune_schema(&schema);
        assert!(pruned.get("additionalProperties").is_none());
        assert!(pruned.get("$schema").is_none());
        assert!(pruned["properties"]["x"].get("format").is_none());
        assert!(pruned["properties"]["x"].get("default").is_none());
        assert_eq!(pruned["properties"]["y"]["format"], "enum");
    }

    #[test]
    fn pruning_is_idempotent() {
        let schema = json!({"additionalProperties": true, "properties": {"a": {"format": "uri"}}});
        let once = prune_schema(&schema);
        let twice = prune_schema(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn named_choice_maps_to_any_with_allow_list() {
        let tools = vec![FunctionDeclaration { name: "get_weather".to_string(), description: None, parameters: None }];
        let (decls, config) = process(&tools, Some(ToolChoiceSpec::Named("get_weather".to_string())));
        assert!(decls.is_some());
        let config = config.unwrap();
        assert_eq!(config.function_calling_config.mode, FunctionCallingMode::Any);
        assert_eq!(config.function_calling_config.allowed_function_names, Some(vec!["get_weather".to_string()]));
    }

    #[test]
    fn bash_built_in_rewritten_to_fixed_declaration() {
        let spec = ToolSpec { name: "bash".to_string(), description: None, parameters: None };
        let decl = declaration_for(&spec, Some("bash_20250124"));
        assert_eq!(decl.name, "bash");
        assert!(decl.parameters.is_some());
    }

    #[test]
    fn empty_tools_yields_no_config() {
        let (decls, config) = process(&[], None);
        assert!(decls.is_none());
        assert!(config.is_none());
    }
}
