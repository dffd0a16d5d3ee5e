//! OpenAI provider implementation.

use async_trait::async_trait;

use super::config::OpenAiConfig;
use super::responses;
use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::{
    attach_raw, bearer_auth, CompatQuirks, OpenAiCompatEngine,
};
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport::{self, sse::SseMode};
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::completion::{TextCompletionRequest, TextCompletionResponse};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::image::{ImageGenerationRequest, ImageGenerationResponse, ImageSize};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse};
use crate::core::types::response::ChatResponse;
use crate::core::types::responses_api::{ResponsesRequest, ResponsesResponse};
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, join_url};

pub struct OpenAiProvider {
    engine: OpenAiCompatEngine,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self {
            engine: OpenAiCompatEngine::new(
                Provider::OpenAi,
                config.base_url,
                client,
                bearer_auth(),
                CompatQuirks::default(),
            ),
        })
    }

    fn headers(&self, key: &Key) -> Result<reqwest::header::HeaderMap> {
        transport::build_headers(&[
            ("Authorization", format!("Bearer {}", key.value)),
            ("Content-Type", "application/json".to_string()),
        ])
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_key(&self) -> Provider {
        Provider::OpenAi
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
            RequestType::TextCompletion,
            RequestType::TextCompletionStream,
            RequestType::Responses,
            RequestType::ResponsesStream,
            RequestType::Embedding,
            RequestType::ImageGeneration,
            RequestType::ListModels,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        self.engine.chat(ctx, key, request).await
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        self.engine.chat_stream(ctx, post_hook, key, request).await
    }

    async fn text_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: TextCompletionRequest,
    ) -> Result<TextCompletionResponse> {
        self.engine.text_completion(ctx, key, request).await
    }

    async fn text_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: TextCompletionRequest,
    ) -> Result<ChunkStream> {
        self.engine
            .text_completion_stream(ctx, post_hook, key, request)
            .await
    }

    async fn responses(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ResponsesRequest,
    ) -> Result<ResponsesResponse> {
        let payload = responses::build_responses_payload(&request, false)?;
        let url = join_url(&self.engine.base_url, "responses");
        let body = transport::post_json(
            &self.engine.client,
            &Provider::OpenAi,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        responses::parse_responses_response(ctx, &body)
    }

    async fn responses_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ResponsesRequest,
    ) -> Result<ChunkStream> {
        let payload = responses::build_responses_payload(&request, true)?;
        let url = join_url(&self.engine.base_url, "responses");
        let headers = transport::build_headers(&[
            ("Authorization", format!("Bearer {}", key.value)),
            ("Content-Type", "application/json".to_string()),
            ("Accept", "text/event-stream".to_string()),
        ])?;
        let response = transport::post_stream(
            &self.engine.client,
            &Provider::OpenAi,
            &url,
            headers,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            Provider::OpenAi,
            request.model.clone(),
            RequestType::ResponsesStream,
            StreamState::new(request.model.clone()),
        );
        tokio::spawn(streaming::drive_sse(
            response,
            SseMode::DataOnly,
            emitter,
            responses::convert_responses_frame,
            |_state| Vec::new(),
        ));
        Ok(stream)
    }

    async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        self.engine.embedding(ctx, key, request).await
    }

    async fn image_generation(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        // Size is validated before anything reaches the wire.
        if let Some(size) = &request.params.size {
            ImageSize::parse(size)?;
        }

        let mut payload = serde_json::json!({
            "model": request.model,
            "prompt": request.input,
        });
        if let Some(size) = &request.params.size {
            payload["size"] = size.clone().into();
        }
        if let Some(n) = request.params.n {
            payload["n"] = n.into();
        }
        if let Some(quality) = &request.params.quality {
            payload["quality"] = quality.clone().into();
        }
        if let Some(style) = &request.params.style {
            payload["style"] = style.clone().into();
        }
        if let Some(response_format) = &request.params.response_format {
            payload["response_format"] = response_format.clone().into();
        }
        if let Some(output_format) = &request.params.output_format {
            payload["output_format"] =
                crate::core::types::image::normalize_output_format(output_format).into();
        }

        let url = join_url(&self.engine.base_url, "images/generations");
        let body = transport::post_json(
            &self.engine.client,
            &Provider::OpenAi,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        let mut response: ImageGenerationResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed image response: {}", e)))?;
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }

    async fn list_models(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ListModelsRequest,
    ) -> Result<ListModelsResponse> {
        self.engine.list_models(ctx, key, request).await
    }
}
