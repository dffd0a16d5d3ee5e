//! Converse API translation.

use crate::core::context::RequestContext;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::types::chat::{ChatMessage, ChatParams};
use crate::core::types::common::FinishReason;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::message::{ContentPart, MessageContent, MessageRole};
use crate::core::types::response::{ChatChoice, ChatResponse};
use crate::core::types::tools::{FunctionCall, Tool, ToolCall, ToolChoice};
use crate::core::types::usage::Usage;

/// Converse `stopReason` normalization.
pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "stop_sequence" => FinishReason::Stop,
        "tool_use" => FinishReason::ToolCalls,
        other => FinishReason::Other(other.to_string()),
    }
}

/// Build a Converse payload.
pub fn build_converse_payload(input: &[ChatMessage], params: &ChatParams) -> Result<serde_json::Value> {
    if input.is_empty() {
        return Err(GatewayError::operation("chat input must not be empty"));
    }

    let mut system: Vec<serde_json::Value> = Vec::new();
    let mut messages: Vec<serde_json::Value> = Vec::new();

    for message in input {
        match message.role {
            MessageRole::System => {
                if let Some(content) = &message.content {
                    system.push(serde_json::json!({ "text": content.as_text() }));
                }
            }
            MessageRole::Tool => {
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": [{
                        "toolResult": {
                            "toolUseId": message.tool_call_id.clone().unwrap_or_default(),
                            "content": [{
                                "text": message
                                    .content
                                    .as_ref()
                                    .map(|c| c.as_text())
                                    .unwrap_or_default()
                            }],
                        }
                    }],
                }));
            }
            MessageRole::User | MessageRole::Assistant => {
                let role = if message.role == MessageRole::User {
                    "user"
                } else {
                    "assistant"
                };
                let mut blocks = convert_content(&message.content);
                if let Some(tool_calls) = &message.tool_calls {
                    for call in tool_calls {
                        let input: serde_json::Value =
                            serde_json::from_str(&call.function.arguments)
                                .unwrap_or(serde_json::Value::Object(Default::default()));
                        blocks.push(serde_json::json!({
                            "toolUse": {
                                "toolUseId": call.id,
                                "name": call.function.name,
                                "input": input,
                            }
                        }));
                    }
                }
                messages.push(serde_json::json!({ "role": role, "content": blocks }));
            }
        }
    }

    let mut payload = serde_json::json!({ "messages": messages });
    if !system.is_empty() {
        payload["system"] = system.into();
    }

    let mut inference: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
    if let Some(max_tokens) = params.max_completion_tokens {
        inference.insert("maxTokens".to_string(), max_tokens.into());
    }
    if let Some(temperature) = params.temperature {
        if let Some(n) = serde_json::Number::from_f64(temperature) {
            inference.insert("temperature".to_string(), serde_json::Value::Number(n));
        }
    }
    if let Some(top_p) = params.top_p {
        if let Some(n) = serde_json::Number::from_f64(top_p) {
            inference.insert("topP".to_string(), serde_json::Value::Number(n));
        }
    }
    if let Some(stop) = &params.stop {
        inference.insert("stopSequences".to_string(), serde_json::to_value(stop)?);
    }
    if !inference.is_empty() {
        payload["inferenceConfig"] = serde_json::Value::Object(inference);
    }

    if let Some(tools) = &params.tools {
        let specs: Vec<serde_json::Value> = tools.iter().filter_map(tool_to_native).collect();
        if !specs.is_empty() {
            let mut tool_config = serde_json::json!({ "tools": specs });
            if let Some(choice) = &params.tool_choice {
                tool_config["toolChoice"] = tool_choice_to_native(choice);
            }
            payload["toolConfig"] = tool_config;
        }
    }

    for (key, value) in &params.extra_params {
        payload[key.as_str()] = value.clone();
    }
    Ok(payload)
}

fn convert_content(content: &Option<MessageContent>) -> Vec<serde_json::Value> {
    match content {
        Some(MessageContent::Text(text)) => vec![serde_json::json!({ "text": text })],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(serde_json::json!({ "text": text })),
                ContentPart::ImageBase64 { media_type, data } => {
                    let format = media_type.strip_prefix("image/").unwrap_or("png");
                    Some(serde_json::json!({
                        "image": {
                            "format": format,
                            "source": { "bytes": data },
                        }
                    }))
                }
                // Converse has no URL image source.
                ContentPart::ImageUrl { .. } => None,
                ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                    "toolUse": { "toolUseId": id, "name": name, "input": input }
                })),
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some(serde_json::json!({
                    "toolResult": {
                        "toolUseId": tool_use_id,
                        "content": [{ "text": content }],
                    }
                })),
            })
            .collect(),
        None => Vec::new(),
    }
}

fn tool_to_native(tool: &Tool) -> Option<serde_json::Value> {
    let function = tool.function.as_ref()?;
    Some(serde_json::json!({
        "toolSpec": {
            "name": function.name,
            "description": function.description.clone().unwrap_or_default(),
            "inputSchema": {
                "json": function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            },
        }
    }))
}

fn tool_choice_to_native(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "required" => serde_json::json!({ "any": {} }),
            _ => serde_json::json!({ "auto": {} }),
        },
        ToolChoice::Function { function, .. } => {
            serde_json::json!({ "tool": { "name": function.name } })
        }
    }
}

pub fn convert_usage(usage: &serde_json::Value) -> Usage {
    let input = usage
        .get("inputTokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let output = usage
        .get("outputTokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    Usage::new(input, output)
}

/// Parse a Converse response into the unified shape.
pub fn parse_converse_response(
    ctx: &RequestContext,
    model: &str,
    body: &[u8],
) -> Result<ChatResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::decode(format!("malformed converse response: {}", e)))?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    if let Some(content) = value
        .pointer("/output/message/content")
        .and_then(|c| c.as_array())
    {
        for block in content {
            if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
            if let Some(tool_use) = block.get("toolUse") {
                tool_calls.push(ToolCall {
                    id: tool_use
                        .get("toolUseId")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: tool_use
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        arguments: tool_use
                            .get("input")
                            .map(|i| i.to_string())
                            .unwrap_or_else(|| "{}".to_string()),
                    },
                });
            }
        }
    }

    let message = ChatMessage {
        role: MessageRole::Assistant,
        content: if text.is_empty() {
            None
        } else {
            Some(MessageContent::Text(text))
        },
        name: None,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id: None,
    };

    let mut response = ChatResponse {
        id: format!("bedrock-{}", uuid::Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason: value
                .get("stopReason")
                .and_then(|r| r.as_str())
                .map(map_stop_reason),
            logprobs: None,
        }],
        usage: value.get("usage").map(convert_usage),
        system_fingerprint: None,
        extra_fields: Default::default(),
    };
    attach_raw(ctx, &mut response.extra_fields, body);
    Ok(response)
}
