//! Tool definitions, tool calls, and response-format controls.

use serde::{Deserialize, Serialize};

/// A tool offered to the model. `function` tools carry a schema; built-in
/// tool types (server-side search, code execution and friends) carry only
/// their type plus vendor-specific fields in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDefinition>,
    /// Name field used by built-in tools that carry one at the top level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Tool {
    pub fn function(definition: FunctionDefinition) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: Some(definition),
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    /// A built-in tool identified by type alone.
    pub fn builtin(tool_type: impl Into<String>) -> Self {
        Self {
            tool_type: tool_type.into(),
            function: None,
            name: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_function(&self) -> bool {
        self.tool_type == "function"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Tool selection strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"auto"`, `"none"`, or `"required"`.
    Mode(String),
    /// Force a specific function.
    Function {
        #[serde(rename = "type")]
        choice_type: String,
        function: ToolChoiceFunction,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// A completed tool invocation on a response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// Incremental tool-call fragment on a stream delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Structured-output control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tool_has_no_schema() {
        let tool = Tool::builtin("web_search_20250305");
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["type"], "web_search_20250305");
        assert!(json.get("function").is_none());
    }

    #[test]
    fn test_tool_choice_untagged() {
        let auto: ToolChoice = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, ToolChoice::Mode("auto".to_string()));

        let forced: ToolChoice = serde_json::from_str(
            r#"{"type":"function","function":{"name":"get_weather"}}"#,
        )
        .unwrap();
        match forced {
            ToolChoice::Function { function, .. } => assert_eq!(function.name, "get_weather"),
            _ => panic!("expected function choice"),
        }
    }

    #[test]
    fn test_extra_fields_flatten() {
        let json = r#"{"type":"web_search_20250305","max_uses":3}"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.extra.get("max_uses").unwrap(), 3);
        let back = serde_json::to_value(&tool).unwrap();
        assert_eq!(back["max_uses"], 3);
    }
}
