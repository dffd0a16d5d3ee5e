//! Azure OpenAI provider implementation.
//!
//! Azure speaks the OpenAI payload format but scopes URLs by deployment and
//! versions the API via a query parameter. Payload translation is shared
//! with the OpenAI engine; only URL and auth differ.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::{
    attach_raw, build_chat_payload, convert_chat_frame, parse_chat_response,
};
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport::{self, sse::SseMode};
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::image::{ImageGenerationRequest, ImageGenerationResponse, ImageSize};
use crate::core::types::keys::AzureKeyConfig;
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, HttpClientConfig};

/// API version pinned on every OpenAI-flavored request.
pub const API_VERSION: &str = "2024-10-21";

/// Anthropic models served through Azure keep the Anthropic wire version.
pub const ANTHROPIC_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    pub http: HttpClientConfig,
}

pub struct AzureProvider {
    client: reqwest::Client,
}

impl AzureProvider {
    pub fn new(config: AzureConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(&config.http)?,
        })
    }

    fn deployment<'a>(config: &'a AzureKeyConfig, model: &'a str) -> &'a str {
        config
            .deployments
            .get(model)
            .map(String::as_str)
            .unwrap_or(model)
    }

    fn api_version(config: &AzureKeyConfig, model: &str) -> String {
        if let Some(version) = &config.api_version {
            return version.clone();
        }
        if model.starts_with("claude") {
            ANTHROPIC_API_VERSION.to_string()
        } else {
            API_VERSION.to_string()
        }
    }

    fn url(config: &AzureKeyConfig, model: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            config.endpoint.trim_end_matches('/'),
            Self::deployment(config, model),
            operation,
            Self::api_version(config, model)
        )
    }

    fn headers(&self, key: &Key, stream: bool) -> Result<HeaderMap> {
        let mut pairs = vec![
            ("api-key", key.value.clone()),
            ("Content-Type", "application/json".to_string()),
        ];
        if stream {
            pairs.push(("Accept", "text/event-stream".to_string()));
        }
        transport::build_headers(&pairs)
    }
}

#[async_trait]
impl LlmProvider for AzureProvider {
    fn provider_key(&self) -> Provider {
        Provider::Azure
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
            RequestType::Embedding,
            RequestType::ImageGeneration,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let config = key.azure_config()?;
        let payload = build_chat_payload(&request.model, &request.input, &request.params, false)?;
        let url = Self::url(config, &request.model, "chat/completions");
        let body = transport::post_json(
            &self.client,
            &Provider::Azure,
            &url,
            self.headers(key, false)?,
            &payload,
        )
        .await?;
        parse_chat_response(ctx, &body)
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        let config = key.azure_config()?;
        let mut payload =
            build_chat_payload(&request.model, &request.input, &request.params, true)?;
        payload["stream_options"] = serde_json::json!({ "include_usage": true });
        let url = Self::url(config, &request.model, "chat/completions");
        let response = transport::post_stream(
            &self.client,
            &Provider::Azure,
            &url,
            self.headers(key, true)?,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            Provider::Azure,
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

    async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let config = key.azure_config()?;
        let mut payload = serde_json::json!({ "input": request.input });
        if let Some(dimensions) = request.params.dimensions {
            payload["dimensions"] = dimensions.into();
        }
        let url = Self::url(config, &request.model, "embeddings");
        let body = transport::post_json(
            &self.client,
            &Provider::Azure,
            &url,
            self.headers(key, false)?,
            &payload,
        )
        .await?;
        let mut response: EmbeddingResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed embedding response: {}", e)))?;
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }

    async fn image_generation(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        let config = key.azure_config()?;
        if let Some(size) = &request.params.size {
            ImageSize::parse(size)?;
        }
        let mut payload = serde_json::json!({ "prompt": request.input });
        if let Some(size) = &request.params.size {
            payload["size"] = size.clone().into();
        }
        if let Some(n) = request.params.n {
            payload["n"] = n.into();
        }
        if let Some(quality) = &request.params.quality {
            payload["quality"] = quality.clone().into();
        }
        let url = Self::url(config, &request.model, "images/generations");
        let body = transport::post_json(
            &self.client,
            &Provider::Azure,
            &url,
            self.headers(key, false)?,
            &payload,
        )
        .await?;
        let mut response: ImageGenerationResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed image response: {}", e)))?;
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}
