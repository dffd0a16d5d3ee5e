//! Anthropic provider implementation.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::config::AnthropicConfig;
use super::streaming::MessagesStreamConverter;
use super::translation;
use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport::{self, sse::SseMode};
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{
    CountTokensResponse, Provider, RequestType, DEFAULT_PAGE_SIZE,
};
use crate::core::types::completion::{TextCompletionRequest, TextCompletionResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse, ModelEntry};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, join_url};

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self { config, client })
    }

    /// Anthropic authenticates with `x-api-key`, not a bearer token.
    fn headers(&self, key: &Key) -> Result<HeaderMap> {
        transport::build_headers(&[
            ("x-api-key", key.value.clone()),
            ("anthropic-version", self.config.api_version.clone()),
            ("Content-Type", "application/json".to_string()),
        ])
    }

    fn stream_headers(&self, key: &Key) -> Result<HeaderMap> {
        transport::build_headers(&[
            ("x-api-key", key.value.clone()),
            ("anthropic-version", self.config.api_version.clone()),
            ("Content-Type", "application/json".to_string()),
            ("Accept", "text/event-stream".to_string()),
        ])
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_key(&self) -> Provider {
        Provider::Anthropic
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
            RequestType::TextCompletion,
            RequestType::TextCompletionStream,
            RequestType::CountTokens,
            RequestType::ListModels,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let payload = translation::build_messages_payload(
            &request.model,
            &request.input,
            &request.params,
            false,
        )?;
        let url = join_url(&self.config.base_url, "v1/messages");
        let body = transport::post_json(
            &self.client,
            &Provider::Anthropic,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        translation::parse_messages_response(ctx, &body)
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        let payload = translation::build_messages_payload(
            &request.model,
            &request.input,
            &request.params,
            true,
        )?;
        let url = join_url(&self.config.base_url, "v1/messages");
        let response = transport::post_stream(
            &self.client,
            &Provider::Anthropic,
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
            Provider::Anthropic,
            request.model.clone(),
            RequestType::ChatCompletionStream,
            StreamState::new(request.model.clone()),
        );
        let mut converter = MessagesStreamConverter::new();
        tokio::spawn(streaming::drive_sse(
            response,
            SseMode::NamedEvent,
            emitter,
            move |state, frame| converter.convert(state, frame),
            |_state| Vec::new(),
        ));
        Ok(stream)
    }

    async fn text_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: TextCompletionRequest,
    ) -> Result<TextCompletionResponse> {
        let payload = translation::build_complete_payload(&request, false)?;
        let url = join_url(&self.config.base_url, "v1/complete");
        let body = transport::post_json(
            &self.client,
            &Provider::Anthropic,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        translation::parse_complete_response(ctx, &body)
    }

    async fn text_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: TextCompletionRequest,
    ) -> Result<ChunkStream> {
        let payload = translation::build_complete_payload(&request, true)?;
        let url = join_url(&self.config.base_url, "v1/complete");
        let response = transport::post_stream(
            &self.client,
            &Provider::Anthropic,
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
            Provider::Anthropic,
            request.model.clone(),
            RequestType::TextCompletionStream,
            StreamState::new(request.model.clone()),
        );
        tokio::spawn(streaming::drive_sse(
            response,
            SseMode::NamedEvent,
            emitter,
            convert_complete_frame,
            |_state| Vec::new(),
        ));
        Ok(stream)
    }

    async fn count_tokens(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<CountTokensResponse> {
        let mut payload = translation::build_messages_payload(
            &request.model,
            &request.input,
            &request.params,
            false,
        )?;
        // The count endpoint rejects the generation cap.
        payload.as_object_mut().map(|o| o.remove("max_tokens"));

        let url = join_url(&self.config.base_url, "v1/messages/count_tokens");
        let body = transport::post_json(
            &self.client,
            &Provider::Anthropic,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed count response: {}", e)))?;
        let mut response = CountTokensResponse {
            input_tokens: value
                .get("input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }

    async fn list_models(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ListModelsRequest,
    ) -> Result<ListModelsResponse> {
        let mut url = format!(
            "{}?limit={}",
            join_url(&self.config.base_url, "v1/models"),
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
        );
        if let Some(after) = &request.page_token {
            url.push_str(&format!("&after_id={}", after));
        }
        let body =
            transport::get_json(&self.client, &Provider::Anthropic, &url, self.headers(key)?)
                .await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed model list: {}", e)))?;

        let data = value
            .get("data")
            .and_then(|d| d.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        Some(ModelEntry {
                            id: m.get("id")?.as_str()?.to_string(),
                            object: "model".to_string(),
                            created: m
                                .get("created_at")
                                .and_then(|c| c.as_str())
                                .and_then(|c| chrono::DateTime::parse_from_rfc3339(c).ok())
                                .map(|c| c.timestamp()),
                            owned_by: Some("anthropic".to_string()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut response = ListModelsResponse {
            object: "list".to_string(),
            data,
            next_page_token: value
                .get("last_id")
                .and_then(|v| v.as_str())
                .filter(|_| value.get("has_more").and_then(|h| h.as_bool()) == Some(true))
                .map(str::to_string),
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}

/// Legacy `/v1/complete` stream events carry incremental `completion` text.
fn convert_complete_frame(
    state: &mut StreamState,
    frame: crate::core::transport::sse::SseFrame,
) -> Result<streaming::FrameOutput> {
    use crate::core::transport::sse::SseFrame;
    use crate::core::types::StreamChunk;

    let (event, data) = match frame {
        SseFrame::Done => return Ok(streaming::FrameOutput::finish(Vec::new())),
        SseFrame::Event { event, data } => (event.unwrap_or_default(), data),
    };
    let value: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| GatewayError::decode(format!("malformed stream event: {}", e)))?;

    match event.as_str() {
        "completion" => {
            let text = value
                .get("completion")
                .and_then(|c| c.as_str())
                .unwrap_or("");
            state.record_text(text);
            let finish = value
                .get("stop_reason")
                .and_then(|r| r.as_str())
                .map(translation::map_stop_reason);
            let mut chunk = crate::core::types::response::ChatChunk::content_delta(
                state.message_id.clone(),
                state.model.clone(),
                text,
            );
            if let Some(reason) = finish {
                state.finish_reason = Some(reason.clone());
                chunk.choices[0].finish_reason = Some(reason);
                return Ok(streaming::FrameOutput::finish(vec![StreamChunk::Chat(chunk)]));
            }
            Ok(streaming::FrameOutput::chunk(StreamChunk::Chat(chunk)))
        }
        "ping" => Ok(streaming::FrameOutput::none()),
        "error" => Err(GatewayError::provider_api(
            Provider::Anthropic,
            200,
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("stream error")
                .to_string(),
        )),
        _ => Ok(streaming::FrameOutput::none()),
    }
}
