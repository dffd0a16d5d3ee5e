//! Gemini schema translation, shared by the AI Studio and Vertex bindings.

use crate::core::context::RequestContext;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::types::chat::{ChatMessage, ChatParams};
use crate::core::types::common::FinishReason;
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::message::{ContentPart, MessageContent, MessageRole};
use crate::core::types::response::{ChatChoice, ChatResponse};
use crate::core::types::responses_api::{OutputContent, OutputItem};
use crate::core::types::tools::{FunctionCall, Tool, ToolCall};
use crate::core::types::usage::{PromptTokensDetails, Usage};

/// Candidate `finishReason` normalization. Unknown native values default to
/// `stop`, they do not pass through.
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" => FinishReason::ContentFilter,
        "RECITATION" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Deterministic tool-call ID for a function-call part: the model name and
/// the zero-based call index within the response.
pub fn tool_call_id(model: &str, index: u32) -> String {
    format!("call_{}_{}", model, index)
}

/// Build a `generateContent` payload.
pub fn build_generate_content_payload(
    input: &[ChatMessage],
    params: &ChatParams,
) -> Result<serde_json::Value> {
    if input.is_empty() {
        return Err(GatewayError::operation("chat input must not be empty"));
    }

    let mut system_parts: Vec<serde_json::Value> = Vec::new();
    let mut contents: Vec<serde_json::Value> = Vec::new();

    for message in input {
        match message.role {
            MessageRole::System => {
                if let Some(content) = &message.content {
                    system_parts.push(serde_json::json!({ "text": content.as_text() }));
                }
            }
            MessageRole::Tool => {
                contents.push(serde_json::json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": message.tool_call_id.clone().unwrap_or_default(),
                            "response": {
                                "result": message
                                    .content
                                    .as_ref()
                                    .map(|c| c.as_text())
                                    .unwrap_or_default()
                            },
                        }
                    }],
                }));
            }
            MessageRole::User | MessageRole::Assistant => {
                let role = if message.role == MessageRole::User {
                    "user"
                } else {
                    "model"
                };
                let mut parts = convert_parts(&message.content);
                if let Some(tool_calls) = &message.tool_calls {
                    for call in tool_calls {
                        let args: serde_json::Value =
                            serde_json::from_str(&call.function.arguments)
                                .unwrap_or(serde_json::Value::Object(Default::default()));
                        parts.push(serde_json::json!({
                            "functionCall": { "name": call.function.name, "args": args }
                        }));
                    }
                }
                contents.push(serde_json::json!({ "role": role, "parts": parts }));
            }
        }
    }

    let mut payload = serde_json::json!({ "contents": contents });
    if !system_parts.is_empty() {
        payload["systemInstruction"] = serde_json::json!({ "parts": system_parts });
    }

    let mut generation: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
    if let Some(temperature) = params.temperature {
        if let Some(n) = serde_json::Number::from_f64(temperature) {
            generation.insert("temperature".to_string(), serde_json::Value::Number(n));
        }
    }
    if let Some(top_p) = params.top_p {
        if let Some(n) = serde_json::Number::from_f64(top_p) {
            generation.insert("topP".to_string(), serde_json::Value::Number(n));
        }
    }
    if let Some(max_tokens) = params.max_completion_tokens {
        generation.insert("maxOutputTokens".to_string(), max_tokens.into());
    }
    if let Some(stop) = &params.stop {
        generation.insert("stopSequences".to_string(), serde_json::to_value(stop)?);
    }
    if !generation.is_empty() {
        payload["generationConfig"] = serde_json::Value::Object(generation);
    }

    if let Some(tools) = &params.tools {
        let declarations: Vec<serde_json::Value> = tools
            .iter()
            .filter_map(|tool: &Tool| {
                let function = tool.function.as_ref()?;
                Some(serde_json::json!({
                    "name": function.name,
                    "description": function.description.clone().unwrap_or_default(),
                    "parameters": function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                }))
            })
            .collect();
        if !declarations.is_empty() {
            payload["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
        }
    }

    for (key, value) in &params.extra_params {
        payload[key.as_str()] = value.clone();
    }
    Ok(payload)
}

fn convert_parts(content: &Option<MessageContent>) -> Vec<serde_json::Value> {
    match content {
        Some(MessageContent::Text(text)) => vec![serde_json::json!({ "text": text })],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(serde_json::json!({ "text": text })),
                ContentPart::ImageBase64 { media_type, data } => Some(serde_json::json!({
                    "inlineData": { "mimeType": media_type, "data": data }
                })),
                ContentPart::ImageUrl { image_url } => Some(serde_json::json!({
                    "fileData": { "fileUri": image_url.url }
                })),
                ContentPart::ToolUse { name, input, .. } => Some(serde_json::json!({
                    "functionCall": { "name": name, "args": input }
                })),
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some(serde_json::json!({
                    "functionResponse": {
                        "name": tool_use_id,
                        "response": { "result": content },
                    }
                })),
            })
            .collect(),
        None => Vec::new(),
    }
}

/// `usageMetadata` → unified usage.
pub fn convert_usage(metadata: &serde_json::Value) -> Usage {
    let prompt = metadata
        .get("promptTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let completion = metadata
        .get("candidatesTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let cached = metadata
        .get("cachedContentTokenCount")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);

    let mut usage = Usage::new(prompt, completion);
    if let Some(cached) = cached {
        usage.prompt_tokens_details = Some(PromptTokensDetails {
            cached_tokens: Some(cached),
            ..Default::default()
        });
    }
    usage
}

/// Parse a `generateContent` response into the unified chat shape.
pub fn parse_generate_content_response(
    ctx: &RequestContext,
    model: &str,
    body: &[u8],
) -> Result<ChatResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::decode(format!("malformed generate response: {}", e)))?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut finish_reason = None;

    if let Some(candidate) = value
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        if let Some(parts) = candidate.pointer("/content/parts").and_then(|p| p.as_array()) {
            for part in parts {
                if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(t);
                }
                if let Some(function_call) = part.get("functionCall") {
                    let index = tool_calls.len() as u32;
                    tool_calls.push(ToolCall {
                        id: tool_call_id(model, index),
                        call_type: "function".to_string(),
                        function: FunctionCall {
                            name: function_call
                                .get("name")
                                .and_then(|n| n.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            arguments: function_call
                                .get("args")
                                .map(|a| a.to_string())
                                .unwrap_or_else(|| "{}".to_string()),
                        },
                    });
                }
            }
        }
        finish_reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .map(map_finish_reason);
    }

    // A response whose parts include function calls finishes with
    // tool_calls regardless of the native reason.
    if !tool_calls.is_empty() {
        finish_reason = Some(FinishReason::ToolCalls);
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
        id: value
            .get("responseId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("gemini-{}", uuid::Uuid::new_v4())),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: value
            .get("modelVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(model)
            .to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason,
            logprobs: None,
        }],
        usage: value.get("usageMetadata").map(convert_usage),
        system_fingerprint: None,
        extra_fields: Default::default(),
    };
    attach_raw(ctx, &mut response.extra_fields, body);
    Ok(response)
}

/// Convert Gemini code-execution parts into responses output items.
///
/// An `executableCode` part with a `thoughtSignature` becomes a reasoning
/// item carrying that signature plus a separate code-interpreter item; a
/// `codeExecutionResult` attaches to the preceding code-interpreter item;
/// a `text` part keeps its own signature on the content block. Signatures
/// never become standalone items.
pub fn parts_to_output_items(model: &str, parts: &[serde_json::Value]) -> Vec<OutputItem> {
    let mut items = Vec::new();
    let mut call_index = 0u32;

    for part in parts {
        let signature = part
            .get("thoughtSignature")
            .and_then(|s| s.as_str())
            .map(str::to_string);

        if let Some(executable) = part.get("executableCode") {
            if let Some(signature) = signature.clone() {
                items.push(OutputItem::Reasoning {
                    id: None,
                    summary: Vec::new(),
                    encrypted_content: Some(signature),
                    status: None,
                });
            }
            items.push(OutputItem::CodeInterpreterCall {
                id: Some(tool_call_id(model, call_index)),
                code: executable
                    .get("code")
                    .and_then(|c| c.as_str())
                    .map(str::to_string),
                outputs: Vec::new(),
                status: Some("completed".to_string()),
            });
            call_index += 1;
            continue;
        }

        if let Some(result) = part.get("codeExecutionResult") {
            // Attach to the code call it belongs to.
            if let Some(OutputItem::CodeInterpreterCall { outputs, .. }) = items
                .iter_mut()
                .rev()
                .find(|item| matches!(item, OutputItem::CodeInterpreterCall { .. }))
            {
                outputs.push(result.clone());
            }
            continue;
        }

        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            items.push(OutputItem::Message {
                id: None,
                role: "assistant".to_string(),
                status: Some("completed".to_string()),
                content: vec![OutputContent::OutputText {
                    text: text.to_string(),
                    annotations: Vec::new(),
                    thought_signature: signature,
                }],
            });
        }
    }
    items
}

/// Convert a full response into responses output items, keeping the raw
/// `usageMetadata` so the reverse direction can reattach it untouched.
pub fn generate_response_to_output(
    model: &str,
    value: &serde_json::Value,
) -> (Vec<OutputItem>, Option<serde_json::Value>) {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();
    (
        parts_to_output_items(model, &parts),
        value.get("usageMetadata").cloned(),
    )
}

/// Rebuild a native response from output items. `usage_metadata` is the
/// verbatim value captured by [`generate_response_to_output`].
pub fn output_to_generate_response(
    items: &[OutputItem],
    usage_metadata: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut response = serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": output_items_to_parts(items) }
        }]
    });
    if let Some(metadata) = usage_metadata {
        response["usageMetadata"] = metadata;
    }
    response
}

/// The reverse of [`parts_to_output_items`]: a reasoning + code-interpreter
/// + message triple becomes exactly three parts, with the signature on the
/// `executableCode` and `text` parts and never standing alone.
pub fn output_items_to_parts(items: &[OutputItem]) -> Vec<serde_json::Value> {
    let mut parts = Vec::new();
    let mut pending_signature: Option<String> = None;

    for item in items {
        match item {
            OutputItem::Reasoning {
                encrypted_content, ..
            } => {
                // Held until the next executable-code part; never emitted
                // as its own part.
                pending_signature = encrypted_content.clone();
            }
            OutputItem::CodeInterpreterCall { code, outputs, .. } => {
                let mut part = serde_json::json!({
                    "executableCode": {
                        "language": "PYTHON",
                        "code": code.clone().unwrap_or_default(),
                    }
                });
                if let Some(signature) = pending_signature.take() {
                    part["thoughtSignature"] = signature.into();
                }
                parts.push(part);
                for output in outputs {
                    parts.push(serde_json::json!({ "codeExecutionResult": output }));
                }
            }
            OutputItem::Message { content, .. } => {
                for block in content {
                    if let OutputContent::OutputText {
                        text,
                        thought_signature,
                        ..
                    } = block
                    {
                        let mut part = serde_json::json!({ "text": text });
                        if let Some(signature) = thought_signature {
                            part["thoughtSignature"] = signature.clone().into();
                        }
                        parts.push(part);
                    }
                }
            }
            _ => {}
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_defaults_to_stop() {
        assert_eq!(map_finish_reason("STOP"), FinishReason::Stop);
        assert_eq!(map_finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(map_finish_reason("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("RECITATION"), FinishReason::ContentFilter);
        assert_eq!(map_finish_reason("OTHER"), FinishReason::Stop);
        assert_eq!(map_finish_reason("BLOCKLIST"), FinishReason::Stop);
    }

    #[test]
    fn test_function_call_parse_with_generated_id() {
        let ctx = RequestContext::new();
        let body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_weather", "args": {"location": "Mumbai"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 6, "totalTokenCount": 14}
        });
        let response = parse_generate_content_response(
            &ctx,
            "gemini-2.0-flash",
            serde_json::to_vec(&body).unwrap().as_slice(),
        )
        .unwrap();

        let choice = &response.choices[0];
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        let call = &choice.message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id, "call_gemini-2.0-flash_0");
        assert_eq!(call.call_type, "function");
        assert_eq!(call.function.name, "get_weather");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&call.function.arguments).unwrap(),
            serde_json::json!({"location": "Mumbai"})
        );
    }

    #[test]
    fn test_code_execution_parts_round_trip() {
        let parts = vec![
            serde_json::json!({
                "executableCode": {"language": "PYTHON", "code": "print(2+2)"},
                "thoughtSignature": "c2lnLWNvZGU="
            }),
            serde_json::json!({
                "codeExecutionResult": {"outcome": "OUTCOME_OK", "output": "4\n"}
            }),
            serde_json::json!({
                "text": "The answer is 4.",
                "thoughtSignature": "c2lnLXRleHQ="
            }),
        ];

        let items = parts_to_output_items("gemini-2.5-pro", &parts);
        // reasoning + code call + message
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], OutputItem::Reasoning { .. }));
        assert!(matches!(items[1], OutputItem::CodeInterpreterCall { .. }));
        assert!(matches!(items[2], OutputItem::Message { .. }));

        let back = output_items_to_parts(&items);
        assert_eq!(back.len(), 3, "must be exactly three parts");
        assert_eq!(back[0]["executableCode"]["code"], "print(2+2)");
        assert_eq!(back[0]["thoughtSignature"], "c2lnLWNvZGU=");
        assert_eq!(back[1]["codeExecutionResult"]["output"], "4\n");
        assert!(back[1].get("thoughtSignature").is_none());
        assert_eq!(back[2]["text"], "The answer is 4.");
        assert_eq!(back[2]["thoughtSignature"], "c2lnLXRleHQ=");

        // No part may be a bare signature.
        for part in &back {
            let object = part.as_object().unwrap();
            assert!(!(object.len() == 1 && object.contains_key("thoughtSignature")));
        }
    }

    #[test]
    fn test_response_round_trip_preserves_usage_metadata() {
        let native = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {
                        "executableCode": {"language": "PYTHON", "code": "print(2+2)"},
                        "thoughtSignature": "c2lnLWNvZGU="
                    },
                    {"codeExecutionResult": {"outcome": "OUTCOME_OK", "output": "4\n"}},
                    {"text": "The answer is 4.", "thoughtSignature": "c2lnLXRleHQ="}
                ]}
            }],
            "usageMetadata": {
                "promptTokenCount": 42,
                "candidatesTokenCount": 17,
                "totalTokenCount": 59,
                "thoughtsTokenCount": 6
            }
        });

        let (items, usage_metadata) =
            generate_response_to_output("gemini-2.5-pro", &native);
        let back = output_to_generate_response(&items, usage_metadata);

        // Three parts, signatures in place, usage metadata untouched.
        assert_eq!(
            back["candidates"][0]["content"]["parts"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
        assert_eq!(back["usageMetadata"], native["usageMetadata"]);
    }

    #[test]
    fn test_system_instruction_split() {
        let input = vec![ChatMessage::system("be terse"), ChatMessage::user("hi")];
        let payload = build_generate_content_payload(&input, &ChatParams::default()).unwrap();
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(payload["contents"].as_array().unwrap().len(), 1);
        assert_eq!(payload["contents"][0]["role"], "user");
    }

    #[test]
    fn test_assistant_maps_to_model_role() {
        let input = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("more"),
        ];
        let payload = build_generate_content_payload(&input, &ChatParams::default()).unwrap();
        assert_eq!(payload["contents"][1]["role"], "model");
    }

    #[test]
    fn test_usage_with_cached_tokens() {
        let usage = convert_usage(&serde_json::json!({
            "promptTokenCount": 100,
            "candidatesTokenCount": 20,
            "totalTokenCount": 120,
            "cachedContentTokenCount": 60
        }));
        assert_eq!(usage.total_tokens, 120);
        assert_eq!(
            usage.prompt_tokens_details.unwrap().cached_tokens,
            Some(60)
        );
    }
}
