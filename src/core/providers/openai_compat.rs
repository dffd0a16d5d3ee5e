//! The shared OpenAI-format engine.
//!
//! A large share of the provider family speaks the OpenAI wire format with
//! small deviations. Instead of one implementation per backend, this module
//! holds a single engine parameterized by base URL, auth-header builder,
//! provider-identity stamp, and quirks; thin provider modules bind it.

use reqwest::header::HeaderMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::streaming::{self, FrameOutput, StreamEmitter, StreamState};
use crate::core::transport::{self, sse::SseFrame, sse::SseMode};
use crate::core::types::chat::{ChatMessage, ChatParams, ChatRequest};
use crate::core::types::common::{FinishReason, Provider, RequestType};
use crate::core::types::completion::{TextCompletionRequest, TextCompletionResponse};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::message::{ContentPart, MessageContent, MessageRole};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse};
use crate::core::types::response::{ChatChunk, ChatResponse};
use crate::core::types::{ChunkStream, Key, StreamChunk};
use crate::utils::net::join_url;

/// Builds the auth headers for one request. Bearer is the default shape;
/// Azure's `api-key` and friends override it.
pub type AuthHeaderBuilder = Arc<dyn Fn(&Key) -> Vec<(&'static str, String)> + Send + Sync>;

pub fn bearer_auth() -> AuthHeaderBuilder {
    Arc::new(|key: &Key| vec![("Authorization", format!("Bearer {}", key.value))])
}

/// Per-backend deviations from the plain OpenAI format.
#[derive(Debug, Clone, Default)]
pub struct CompatQuirks {
    /// Never emit `stream_options` in streaming payloads.
    pub omit_stream_options: bool,
    /// Prefix stamped onto model IDs in list-models responses
    /// (e.g. `nebius/`).
    pub list_models_prefix: Option<&'static str>,
}

/// One OpenAI-compatible backend binding.
pub struct OpenAiCompatEngine {
    pub provider: Provider,
    pub base_url: String,
    pub client: reqwest::Client,
    pub auth: AuthHeaderBuilder,
    pub quirks: CompatQuirks,
}

impl OpenAiCompatEngine {
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        client: reqwest::Client,
        auth: AuthHeaderBuilder,
        quirks: CompatQuirks,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            client,
            auth,
            quirks,
        }
    }

    fn headers(&self, key: &Key) -> Result<HeaderMap> {
        let mut pairs = (self.auth)(key);
        pairs.push(("Content-Type", "application/json".to_string()));
        transport::build_headers(&pairs)
    }

    fn stream_headers(&self, key: &Key) -> Result<HeaderMap> {
        let mut pairs = (self.auth)(key);
        pairs.push(("Content-Type", "application/json".to_string()));
        pairs.push(("Accept", "text/event-stream".to_string()));
        transport::build_headers(&pairs)
    }

    pub async fn chat(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let payload = build_chat_payload(&request.model, &request.input, &request.params, false)?;
        let url = join_url(&self.base_url, "chat/completions");
        // Routed through the large-response path: a context-configured
        // threshold turns an oversized body into a prefetched head plus a
        // streaming remainder stashed on the context.
        let response = self
            .client
            .post(&url)
            .headers(self.headers(key)?)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let err: GatewayError = e.into();
                err.with_provider(self.provider.clone())
            })?;
        let body = transport::read_body_with_large_support(ctx, &self.provider, response).await?;
        parse_chat_response(ctx, &body)
    }

    pub async fn chat_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        let mut payload =
            build_chat_payload(&request.model, &request.input, &request.params, true)?;
        if !self.quirks.omit_stream_options {
            payload["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        let url = join_url(&self.base_url, "chat/completions");
        let response = transport::post_stream(
            &self.client,
            &self.provider,
            &url,
            self.stream_headers(key)?,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            self.provider.clone(),
            request.model.clone(),
            RequestType::ChatCompletionStream,
            StreamState::new(request.model.clone()),
        );
        tokio::spawn(streaming::drive_sse(
            response,
            SseMode::DataOnly,
            emitter,
            convert_chat_frame,
            |_state| Vec::new(),
        ));
        Ok(stream)
    }

    pub async fn text_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: TextCompletionRequest,
    ) -> Result<TextCompletionResponse> {
        let payload = build_text_payload(&request, false)?;
        let url = join_url(&self.base_url, "completions");
        let body =
            transport::post_json(&self.client, &self.provider, &url, self.headers(key)?, &payload)
                .await?;
        let mut response: TextCompletionResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed completion response: {}", e)))?;
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }

    pub async fn text_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: TextCompletionRequest,
    ) -> Result<ChunkStream> {
        let mut payload = build_text_payload(&request, true)?;
        if !self.quirks.omit_stream_options {
            payload["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        let url = join_url(&self.base_url, "completions");
        let response = transport::post_stream(
            &self.client,
            &self.provider,
            &url,
            self.stream_headers(key)?,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            self.provider.clone(),
            request.model.clone(),
            RequestType::TextCompletionStream,
            StreamState::new(request.model.clone()),
        );
        tokio::spawn(streaming::drive_sse(
            response,
            SseMode::DataOnly,
            emitter,
            convert_text_frame,
            |_state| Vec::new(),
        ));
        Ok(stream)
    }

    pub async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let mut payload = serde_json::json!({
            "model": request.model,
            "input": request.input,
        });
        if let Some(dimensions) = request.params.dimensions {
            payload["dimensions"] = dimensions.into();
        }
        if let Some(format) = &request.params.encoding_format {
            payload["encoding_format"] = format.clone().into();
        }
        if let Some(user) = &request.params.user {
            payload["user"] = user.clone().into();
        }
        merge_extra_params(&mut payload, &request.params.extra_params);

        let url = join_url(&self.base_url, "embeddings");
        let body =
            transport::post_json(&self.client, &self.provider, &url, self.headers(key)?, &payload)
                .await?;
        let mut response: EmbeddingResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed embedding response: {}", e)))?;
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }

    pub async fn list_models(
        &self,
        ctx: &RequestContext,
        key: &Key,
        _request: ListModelsRequest,
    ) -> Result<ListModelsResponse> {
        let url = join_url(&self.base_url, "models");
        let body =
            transport::get_json(&self.client, &self.provider, &url, self.headers(key)?).await?;
        let mut response: ListModelsResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed model list: {}", e)))?;
        if let Some(prefix) = self.quirks.list_models_prefix {
            for model in &mut response.data {
                if !model.id.starts_with(prefix) {
                    model.id = format!("{}{}", prefix, model.id);
                }
            }
        }
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}

/// Models whose parameter surface drops sampling controls. Reasoning-class
/// requests must not carry `temperature` or a completion-token cap.
pub fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4") || model.starts_with("gpt-5")
}

/// Build a `chat/completions` payload from the unified request.
pub fn build_chat_payload(
    model: &str,
    input: &[ChatMessage],
    params: &ChatParams,
    stream: bool,
) -> Result<serde_json::Value> {
    if input.is_empty() {
        return Err(GatewayError::operation("chat input must not be empty"));
    }

    let messages: Vec<serde_json::Value> = input.iter().map(convert_message).collect();
    let mut payload = serde_json::json!({
        "model": model,
        "messages": messages,
    });

    let reasoning = is_reasoning_model(model);
    if !reasoning {
        if let Some(temperature) = params.temperature {
            payload["temperature"] = number(temperature);
        }
        if let Some(max_completion_tokens) = params.max_completion_tokens {
            payload["max_completion_tokens"] = max_completion_tokens.into();
        }
    }
    if let Some(top_p) = params.top_p {
        payload["top_p"] = number(top_p);
    }
    if let Some(stop) = &params.stop {
        payload["stop"] = serde_json::to_value(stop)?;
    }
    if let Some(tools) = &params.tools {
        payload["tools"] = serde_json::to_value(tools)?;
    }
    if let Some(tool_choice) = &params.tool_choice {
        payload["tool_choice"] = serde_json::to_value(tool_choice)?;
    }
    if let Some(parallel) = params.parallel_tool_calls {
        payload["parallel_tool_calls"] = parallel.into();
    }
    if let Some(response_format) = &params.response_format {
        payload["response_format"] = serde_json::to_value(response_format)?;
    }
    if let Some(effort) = &params.reasoning_effort {
        payload["reasoning_effort"] = effort.clone().into();
    }
    if let Some(user) = &params.user {
        payload["user"] = user.clone().into();
    }
    if let Some(seed) = params.seed {
        payload["seed"] = seed.into();
    }
    if stream {
        payload["stream"] = true.into();
    }
    merge_extra_params(&mut payload, &params.extra_params);
    Ok(payload)
}

fn build_text_payload(request: &TextCompletionRequest, stream: bool) -> Result<serde_json::Value> {
    if request.input.is_empty() {
        return Err(GatewayError::operation("prompt must not be empty"));
    }
    let mut payload = serde_json::json!({
        "model": request.model,
        "prompt": request.input,
    });
    if let Some(temperature) = request.params.temperature {
        payload["temperature"] = number(temperature);
    }
    if let Some(max_tokens) = request.params.max_completion_tokens {
        payload["max_tokens"] = max_tokens.into();
    }
    if let Some(top_p) = request.params.top_p {
        payload["top_p"] = number(top_p);
    }
    if let Some(stop) = &request.params.stop {
        payload["stop"] = serde_json::to_value(stop)?;
    }
    if stream {
        payload["stream"] = true.into();
    }
    merge_extra_params(&mut payload, &request.params.extra_params);
    Ok(payload)
}

fn convert_message(message: &ChatMessage) -> serde_json::Value {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };
    let mut out = serde_json::json!({ "role": role });

    match &message.content {
        Some(MessageContent::Text(text)) => {
            out["content"] = text.clone().into();
        }
        Some(MessageContent::Parts(parts)) => {
            let converted: Vec<serde_json::Value> =
                parts.iter().filter_map(convert_content_part).collect();
            out["content"] = converted.into();
        }
        None => {}
    }

    if let Some(name) = &message.name {
        out["name"] = name.clone().into();
    }
    if let Some(tool_calls) = &message.tool_calls {
        out["tool_calls"] = serde_json::to_value(tool_calls).unwrap_or_default();
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        out["tool_call_id"] = tool_call_id.clone().into();
    }
    out
}

fn convert_content_part(part: &ContentPart) -> Option<serde_json::Value> {
    match part {
        ContentPart::Text { text } => Some(serde_json::json!({
            "type": "text",
            "text": text,
        })),
        ContentPart::ImageUrl { image_url } => Some(serde_json::json!({
            "type": "image_url",
            "image_url": image_url,
        })),
        // Inline images travel as data URLs in the OpenAI format.
        ContentPart::ImageBase64 { media_type, data } => Some(serde_json::json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", media_type, data) },
        })),
        // Tool blocks are carried on the message level in this format.
        ContentPart::ToolUse { .. } | ContentPart::ToolResult { .. } => None,
    }
}

pub fn parse_chat_response(ctx: &RequestContext, body: &[u8]) -> Result<ChatResponse> {
    let mut response: ChatResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::decode(format!("malformed chat response: {}", e)))?;
    if let Some(usage) = &mut response.usage {
        if usage.total_tokens == 0 {
            usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
        }
    }
    attach_raw(ctx, &mut response.extra_fields, body);
    Ok(response)
}

pub(crate) fn attach_raw(
    ctx: &RequestContext,
    extra: &mut crate::core::types::common::ResponseExtraFields,
    body: &[u8],
) {
    if ctx.should_send_back_raw_response() {
        extra.raw_response = serde_json::from_slice(body).ok();
    }
}

pub(crate) fn merge_extra_params(
    payload: &mut serde_json::Value,
    extra: &serde_json::Map<String, serde_json::Value>,
) {
    if let Some(object) = payload.as_object_mut() {
        for (key, value) in extra {
            object.insert(key.clone(), value.clone());
        }
    }
}

fn number(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Convert one anonymous-data SSE frame of a chat stream.
pub fn convert_chat_frame(
    state: &mut StreamState,
    frame: SseFrame,
) -> Result<FrameOutput> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameOutput::finish(Vec::new())),
        SseFrame::Event { data, .. } => data,
    };

    let mut chunk: ChatChunk = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed stream chunk: {}", e)))?;

    if !chunk.id.is_empty() {
        state.message_id = chunk.id.clone();
    }
    if !chunk.model.is_empty() {
        state.model = chunk.model.clone();
    }
    if let Some(usage) = &chunk.usage {
        state.record_usage(usage);
    }
    for choice in &chunk.choices {
        if let Some(text) = &choice.delta.content {
            state.record_text(text);
        }
        if choice.delta.tool_calls.is_some() {
            state.record_tool_call();
        }
        if let Some(reason) = &choice.finish_reason {
            state.finish_reason = Some(reason.clone());
        }
    }
    if chunk.usage.is_some() && state.saw_usage && chunk.choices.is_empty() {
        // Usage-only trailer: keep it, the [DONE] marker closes the stream.
        chunk.usage = Some(state.usage.clone());
    }
    Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
}

/// Convert one SSE frame of a legacy text-completion stream into the chat
/// chunk shape.
pub fn convert_text_frame(
    state: &mut StreamState,
    frame: SseFrame,
) -> Result<FrameOutput> {
    let data = match frame {
        SseFrame::Done => return Ok(FrameOutput::finish(Vec::new())),
        SseFrame::Event { data, .. } => data,
    };

    let value: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed stream chunk: {}", e)))?;

    if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
        state.message_id = id.to_string();
    }
    if let Some(model) = value.get("model").and_then(|v| v.as_str()) {
        state.model = model.to_string();
    }

    let mut chunk = ChatChunk::new(state.message_id.clone(), state.model.clone());
    if let Some(choice) = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        let text = choice.get("text").and_then(|t| t.as_str()).unwrap_or("");
        state.record_text(text);
        chunk = chunk.with_delta(crate::core::types::response::ChatDelta {
            content: Some(text.to_string()),
            ..Default::default()
        });
        if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
            let reason = FinishReason::from(reason);
            state.finish_reason = Some(reason.clone());
            chunk.choices[0].finish_reason = Some(reason);
        }
    }
    Ok(FrameOutput::chunk(StreamChunk::Chat(chunk)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tools::{FunctionDefinition, Tool};

    fn params() -> ChatParams {
        ChatParams {
            temperature: Some(0.7),
            max_completion_tokens: Some(256),
            ..Default::default()
        }
    }

    #[test]
    fn test_reasoning_model_detection() {
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o3-mini"));
        assert!(is_reasoning_model("gpt-5"));
        assert!(is_reasoning_model("gpt-5-turbo"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("gpt-4.1"));
    }

    #[test]
    fn test_reasoning_model_strips_sampling_params() {
        let input = vec![ChatMessage::user("hi")];
        let payload = build_chat_payload("o1-preview", &input, &params(), false).unwrap();
        assert!(payload.get("temperature").is_none());
        assert!(payload.get("max_completion_tokens").is_none());

        let payload = build_chat_payload("gpt-4o", &input, &params(), false).unwrap();
        assert_eq!(payload["temperature"], 0.7);
        assert_eq!(payload["max_completion_tokens"], 256);
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = build_chat_payload("gpt-4o", &[], &ChatParams::default(), false).unwrap_err();
        assert_eq!(err.kind, crate::core::types::errors::ErrorKind::OperationError);
    }

    #[test]
    fn test_tools_serialized() {
        let mut params = ChatParams::default();
        params.tools = Some(vec![Tool::function(FunctionDefinition {
            name: "get_weather".to_string(),
            description: None,
            parameters: Some(serde_json::json!({"type": "object"})),
            strict: None,
        })]);
        let input = vec![ChatMessage::user("hi")];
        let payload = build_chat_payload("gpt-4o", &input, &params, false).unwrap();
        assert_eq!(payload["tools"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn test_base64_image_becomes_data_url() {
        let message = ChatMessage::user(MessageContent::Parts(vec![ContentPart::ImageBase64 {
            media_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        }]));
        let converted = convert_message(&message);
        assert_eq!(
            converted["content"][0]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn test_extra_params_merged() {
        let mut params = ChatParams::default();
        params
            .extra_params
            .insert("frequency_penalty".to_string(), serde_json::json!(0.5));
        let payload =
            build_chat_payload("gpt-4o", &[ChatMessage::user("hi")], &params, false).unwrap();
        assert_eq!(payload["frequency_penalty"], 0.5);
    }

    #[test]
    fn test_convert_chat_frame_done() {
        let mut state = StreamState::new("gpt-4o");
        let output = convert_chat_frame(&mut state, SseFrame::Done).unwrap();
        assert!(output.done);
        assert!(output.chunks.is_empty());
    }

    #[test]
    fn test_convert_chat_frame_delta() {
        let mut state = StreamState::new("gpt-4o");
        let data = r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt-4o-2024-08-06","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        let output = convert_chat_frame(
            &mut state,
            SseFrame::Event {
                event: None,
                data: data.to_string(),
            },
        )
        .unwrap();
        assert_eq!(output.chunks.len(), 1);
        assert_eq!(state.accumulated_text, "Hello");
        assert_eq!(state.message_id, "chatcmpl-1");
        assert_eq!(state.model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn test_convert_chat_frame_tool_call_tracked() {
        let mut state = StreamState::new("gpt-4o");
        let data = r#"{"id":"c","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"f","arguments":""}}]}}]}"#;
        convert_chat_frame(
            &mut state,
            SseFrame::Event {
                event: None,
                data: data.to_string(),
            },
        )
        .unwrap();
        assert_eq!(state.tool_call_count, 1);
    }
}
