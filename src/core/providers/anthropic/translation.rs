//! Anthropic schema translation.

use crate::core::context::RequestContext;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::types::chat::{ChatMessage, ChatParams};
use crate::core::types::common::FinishReason;
use crate::core::types::completion::{
    TextCompletionChoice, TextCompletionRequest, TextCompletionResponse,
};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::message::{ContentPart, MessageContent, MessageRole};
use crate::core::types::response::{ChatChoice, ChatResponse};
use crate::core::types::tools::{FunctionCall, Tool, ToolCall, ToolChoice};
use crate::core::types::usage::{
    CacheCreation, CompletionTokensDetails, PromptTokensDetails, Usage,
};

use super::config::DEFAULT_MAX_TOKENS;

/// Built-in server-side tool types. Anything else with a schema is a plain
/// function tool.
const BUILTIN_TOOL_PREFIXES: &[&str] = &[
    "web_search",
    "computer",
    "bash",
    "text_editor",
    "code_execution",
    "str_replace",
];

pub fn is_builtin_tool_type(tool_type: &str) -> bool {
    BUILTIN_TOOL_PREFIXES
        .iter()
        .any(|prefix| tool_type.starts_with(prefix))
}

/// `stop_reason` normalization. Total over the native enum; unknown values
/// pass through.
pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" => FinishReason::Stop,
        "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        other => FinishReason::Other(other.to_string()),
    }
}

/// Build a `/v1/messages` payload.
pub fn build_messages_payload(
    model: &str,
    input: &[ChatMessage],
    params: &ChatParams,
    stream: bool,
) -> Result<serde_json::Value> {
    if input.is_empty() {
        return Err(GatewayError::operation("chat input must not be empty"));
    }

    let mut system_blocks: Vec<serde_json::Value> = Vec::new();
    let mut messages: Vec<serde_json::Value> = Vec::new();

    for message in input {
        match message.role {
            MessageRole::System => match &message.content {
                Some(MessageContent::Text(text)) => {
                    system_blocks.push(serde_json::json!({ "type": "text", "text": text }));
                }
                Some(MessageContent::Parts(parts)) => {
                    for part in parts {
                        if let ContentPart::Text { text } = part {
                            system_blocks
                                .push(serde_json::json!({ "type": "text", "text": text }));
                        }
                    }
                }
                None => {}
            },
            MessageRole::Tool => {
                // Tool results travel as user-role tool_result blocks.
                let content = message
                    .content
                    .as_ref()
                    .map(|c| c.as_text())
                    .unwrap_or_default();
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                        "content": content,
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
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.function.name,
                            "input": input,
                        }));
                    }
                }
                messages.push(serde_json::json!({ "role": role, "content": blocks }));
            }
        }
    }

    let mut payload = serde_json::json!({
        "model": model,
        "messages": messages,
        "max_tokens": params.max_completion_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if !system_blocks.is_empty() {
        // Cache-control hints attach to the last system block.
        if let Some(cache_control) = &params.cache_control {
            if let Some(last) = system_blocks.last_mut() {
                last["cache_control"] = cache_control.clone();
            }
        }
        payload["system"] = system_blocks.into();
    }

    if let Some(temperature) = params.temperature {
        if let Some(n) = serde_json::Number::from_f64(temperature) {
            payload["temperature"] = serde_json::Value::Number(n);
        }
    }
    if let Some(top_p) = params.top_p {
        if let Some(n) = serde_json::Number::from_f64(top_p) {
            payload["top_p"] = serde_json::Value::Number(n);
        }
    }
    if let Some(stop) = &params.stop {
        payload["stop_sequences"] = serde_json::to_value(stop)?;
    }
    if let Some(tools) = &params.tools {
        let converted: Vec<serde_json::Value> = tools.iter().map(tool_to_native).collect();
        payload["tools"] = converted.into();
    }
    if let Some(choice) = &params.tool_choice {
        payload["tool_choice"] = tool_choice_to_native(choice);
    }
    if stream {
        payload["stream"] = true.into();
    }

    for (key, value) in &params.extra_params {
        payload[key.as_str()] = value.clone();
    }
    Ok(payload)
}

fn convert_content(content: &Option<MessageContent>) -> Vec<serde_json::Value> {
    match content {
        Some(MessageContent::Text(text)) => {
            vec![serde_json::json!({ "type": "text", "text": text })]
        }
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => {
                    serde_json::json!({ "type": "text", "text": text })
                }
                ContentPart::ImageUrl { image_url } => serde_json::json!({
                    "type": "image",
                    "source": { "type": "url", "url": image_url.url },
                }),
                ContentPart::ImageBase64 { media_type, data } => serde_json::json!({
                    "type": "image",
                    "source": { "type": "base64", "media_type": media_type, "data": data },
                }),
                ContentPart::ToolUse { id, name, input } => serde_json::json!({
                    "type": "tool_use", "id": id, "name": name, "input": input,
                }),
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let mut block = serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                    });
                    if let Some(is_error) = is_error {
                        block["is_error"] = (*is_error).into();
                    }
                    block
                }
            })
            .collect(),
        None => Vec::new(),
    }
}

/// Unified tool → native. Function tools carry `input_schema`; built-in
/// tools carry only their type (plus vendor fields) and never a schema.
pub fn tool_to_native(tool: &Tool) -> serde_json::Value {
    if tool.is_function() {
        let function = tool.function.as_ref();
        let mut out = serde_json::json!({
            "name": function.map(|f| f.name.clone()).unwrap_or_default(),
            "input_schema": function
                .and_then(|f| f.parameters.clone())
                .unwrap_or_else(|| serde_json::json!({"type": "object"})),
        });
        if let Some(description) = function.and_then(|f| f.description.clone()) {
            out["description"] = description.into();
        }
        return out;
    }

    let mut out = serde_json::json!({ "type": tool.tool_type });
    if let Some(name) = &tool.name {
        out["name"] = name.clone().into();
    }
    for (key, value) in &tool.extra {
        out[key.as_str()] = value.clone();
    }
    out
}

/// Native tool → unified. The symmetric half of [`tool_to_native`]: for
/// every built-in type `T`, `tool_to_native(tool_from_native(x))` has type
/// `T` and no `input_schema`.
pub fn tool_from_native(value: &serde_json::Value) -> Tool {
    let tool_type = value.get("type").and_then(|t| t.as_str());

    match tool_type {
        Some(t) if t != "custom" && is_builtin_tool_type(t) => {
            let mut tool = Tool::builtin(t);
            tool.name = value
                .get("name")
                .and_then(|n| n.as_str())
                .map(str::to_string);
            if let Some(object) = value.as_object() {
                for (key, val) in object {
                    if key != "type" && key != "name" && key != "input_schema" {
                        tool.extra.insert(key.clone(), val.clone());
                    }
                }
            }
            tool
        }
        _ => Tool::function(crate::core::types::tools::FunctionDefinition {
            name: value
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            description: value
                .get("description")
                .and_then(|d| d.as_str())
                .map(str::to_string),
            parameters: value.get("input_schema").cloned(),
            strict: None,
        }),
    }
}

fn tool_choice_to_native(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "none" => serde_json::json!({ "type": "none" }),
            "required" => serde_json::json!({ "type": "any" }),
            _ => serde_json::json!({ "type": "auto" }),
        },
        ToolChoice::Function { function, .. } => {
            serde_json::json!({ "type": "tool", "name": function.name })
        }
    }
}

/// Usage conversion, including the cache-metric mapping:
/// `cache_read_input_tokens` feeds both `cached_tokens` and
/// `cache_read_tokens` on the input side; the output side's `cached_tokens`
/// mirrors `cache_creation_input_tokens`; the ephemeral breakdown is
/// preserved on both detail shapes.
pub fn convert_usage(usage: &serde_json::Value) -> Usage {
    let input_tokens = usage
        .get("input_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let output_tokens = usage
        .get("output_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let cache_creation = usage
        .get("cache_creation_input_tokens")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);
    let cache_read = usage
        .get("cache_read_input_tokens")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);

    let ephemeral = usage.get("cache_creation").map(|detail| CacheCreation {
        ephemeral_5m_input_tokens: detail
            .get("ephemeral_5m_input_tokens")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
        ephemeral_1h_input_tokens: detail
            .get("ephemeral_1h_input_tokens")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32),
    });

    let num_search_queries = usage
        .get("server_tool_use")
        .and_then(|s| s.get("web_search_requests"))
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);

    let prompt_tokens_details =
        if cache_creation.is_some() || cache_read.is_some() || ephemeral.is_some() {
            Some(PromptTokensDetails {
                cached_tokens: cache_read,
                cache_read_tokens: cache_read,
                cache_creation_tokens: cache_creation,
                cache_creation: ephemeral.clone(),
                audio_tokens: None,
            })
        } else {
            None
        };

    let completion_tokens_details =
        if cache_creation.is_some() || ephemeral.is_some() || num_search_queries.is_some() {
            Some(CompletionTokensDetails {
                cached_tokens: cache_creation,
                reasoning_tokens: None,
                num_search_queries,
                cache_creation: ephemeral,
            })
        } else {
            None
        };

    Usage {
        prompt_tokens: input_tokens,
        completion_tokens: output_tokens,
        total_tokens: input_tokens + output_tokens,
        prompt_tokens_details,
        completion_tokens_details,
    }
}

/// Parse a `/v1/messages` response into the unified shape.
pub fn parse_messages_response(ctx: &RequestContext, body: &[u8]) -> Result<ChatResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::decode(format!("malformed messages response: {}", e)))?;

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("msg-{}", uuid::Uuid::new_v4()));
    let model = value
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    if let Some(content) = value.get("content").and_then(|c| c.as_array()) {
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        call_type: "function".to_string(),
                        function: FunctionCall {
                            name: block
                                .get("name")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            arguments: block
                                .get("input")
                                .map(|i| i.to_string())
                                .unwrap_or_else(|| "{}".to_string()),
                        },
                    });
                }
                _ => {}
            }
        }
    }

    let finish_reason = value
        .get("stop_reason")
        .and_then(|r| r.as_str())
        .map(map_stop_reason);
    let usage = value.get("usage").map(convert_usage);

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
        id,
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model,
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason,
            logprobs: None,
        }],
        usage,
        system_fingerprint: None,
        extra_fields: Default::default(),
    };
    attach_raw(ctx, &mut response.extra_fields, body);
    Ok(response)
}

/// Build a legacy `/v1/complete` payload.
pub fn build_complete_payload(request: &TextCompletionRequest, stream: bool) -> Result<serde_json::Value> {
    if request.input.is_empty() {
        return Err(GatewayError::operation("prompt must not be empty"));
    }
    let mut payload = serde_json::json!({
        "model": request.model,
        "prompt": request.input,
        "max_tokens_to_sample": request
            .params
            .max_completion_tokens
            .unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if let Some(temperature) = request.params.temperature {
        if let Some(n) = serde_json::Number::from_f64(temperature) {
            payload["temperature"] = serde_json::Value::Number(n);
        }
    }
    if let Some(stop) = &request.params.stop {
        payload["stop_sequences"] = serde_json::to_value(stop)?;
    }
    if stream {
        payload["stream"] = true.into();
    }
    Ok(payload)
}

pub fn parse_complete_response(ctx: &RequestContext, body: &[u8]) -> Result<TextCompletionResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::decode(format!("malformed completion response: {}", e)))?;

    let mut response = TextCompletionResponse {
        id: value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("cmpl-{}", uuid::Uuid::new_v4())),
        object: "text_completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: value
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        choices: vec![TextCompletionChoice {
            index: 0,
            text: value
                .get("completion")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
            finish_reason: value
                .get("stop_reason")
                .and_then(|r| r.as_str())
                .map(map_stop_reason),
            logprobs: None,
        }],
        usage: None,
        extra_fields: Default::default(),
    };
    attach_raw(ctx, &mut response.extra_fields, body);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tools::FunctionDefinition;

    #[test]
    fn test_stop_reason_table() {
        assert_eq!(map_stop_reason("end_turn"), FinishReason::Stop);
        assert_eq!(map_stop_reason("stop_sequence"), FinishReason::Stop);
        assert_eq!(map_stop_reason("max_tokens"), FinishReason::Length);
        assert_eq!(map_stop_reason("tool_use"), FinishReason::ToolCalls);
        assert_eq!(
            map_stop_reason("refusal"),
            FinishReason::Other("refusal".to_string())
        );
    }

    #[test]
    fn test_system_promoted_out_of_messages() {
        let input = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hi"),
        ];
        let payload =
            build_messages_payload("claude-3-5-sonnet", &input, &ChatParams::default(), false)
                .unwrap();
        assert_eq!(payload["system"][0]["text"], "be terse");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
    }

    #[test]
    fn test_builtin_tool_round_trip() {
        for tool_type in [
            "web_search_20250305",
            "computer_20250124",
            "bash_20250124",
            "text_editor_20250429",
            "code_execution_20250522",
        ] {
            let native = serde_json::json!({ "type": tool_type, "name": "t" });
            let unified = tool_from_native(&native);
            let back = tool_to_native(&unified);
            assert_eq!(back["type"], tool_type);
            assert!(back.get("input_schema").is_none(), "schema leaked for {}", tool_type);
        }
    }

    #[test]
    fn test_function_tool_round_trip_keeps_schema() {
        let tool = Tool::function(FunctionDefinition {
            name: "get_weather".to_string(),
            description: Some("weather".to_string()),
            parameters: Some(serde_json::json!({"type":"object","properties":{}})),
            strict: None,
        });
        let native = tool_to_native(&tool);
        assert_eq!(native["name"], "get_weather");
        assert!(native.get("input_schema").is_some());
        let back = tool_from_native(&native);
        assert!(back.is_function());
        assert_eq!(back.function.unwrap().name, "get_weather");
    }

    #[test]
    fn test_usage_cache_metric_mapping() {
        let usage = convert_usage(&serde_json::json!({
            "input_tokens": 1000,
            "output_tokens": 500,
            "cache_creation_input_tokens": 200,
            "cache_read_input_tokens": 100,
            "cache_creation": {
                "ephemeral_5m_input_tokens": 150,
                "ephemeral_1h_input_tokens": 50
            }
        }));

        assert_eq!(usage.prompt_tokens, 1000);
        assert_eq!(usage.completion_tokens, 500);
        assert_eq!(usage.total_tokens, 1500);

        let prompt = usage.prompt_tokens_details.unwrap();
        assert_eq!(prompt.cached_tokens, Some(100));
        assert_eq!(prompt.cache_read_tokens, Some(100));
        assert_eq!(prompt.cache_creation_tokens, Some(200));
        let ephemeral = prompt.cache_creation.unwrap();
        assert_eq!(ephemeral.ephemeral_5m_input_tokens, Some(150));
        assert_eq!(ephemeral.ephemeral_1h_input_tokens, Some(50));

        // Output mirrors the cache-creation count, not the read count.
        let completion = usage.completion_tokens_details.unwrap();
        assert_eq!(completion.cached_tokens, Some(200));
        assert_eq!(
            completion.cache_creation.unwrap().ephemeral_5m_input_tokens,
            Some(150)
        );
    }

    #[test]
    fn test_search_queries_mapped() {
        let usage = convert_usage(&serde_json::json!({
            "input_tokens": 10,
            "output_tokens": 5,
            "server_tool_use": { "web_search_requests": 3 }
        }));
        assert_eq!(
            usage.completion_tokens_details.unwrap().num_search_queries,
            Some(3)
        );
    }

    #[test]
    fn test_parse_tool_use_response() {
        let ctx = RequestContext::new();
        let body = serde_json::json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet",
            "content": [
                {"type": "text", "text": "calling"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "Mumbai"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20}
        });
        let response =
            parse_messages_response(&ctx, serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        let choice = &response.choices[0];
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&calls[0].function.arguments).unwrap(),
            serde_json::json!({"location": "Mumbai"})
        );
    }

    #[test]
    fn test_tool_message_becomes_tool_result() {
        let input = vec![
            ChatMessage::user("weather?"),
            ChatMessage::tool("toolu_1", "22C"),
        ];
        let payload =
            build_messages_payload("claude-3-5-sonnet", &input, &ChatParams::default(), false)
                .unwrap();
        let blocks = payload["messages"][1]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "tool_result");
        assert_eq!(blocks[0]["tool_use_id"], "toolu_1");
    }
}
