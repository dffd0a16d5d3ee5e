//! Nebius AI Studio provider: OpenAI-compatible with prefixed model IDs.

use async_trait::async_trait;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::{
    bearer_auth, CompatQuirks, OpenAiCompatEngine,
};
use crate::core::traits::provider::LlmProvider;
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::completion::{TextCompletionRequest, TextCompletionResponse};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::Result;
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, HttpClientConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.studio.nebius.ai/v1";

/// Every model ID this provider reports is namespaced with this prefix.
pub const MODEL_ID_PREFIX: &str = "nebius/";

#[derive(Debug, Clone)]
pub struct NebiusConfig {
    pub base_url: String,
    pub http: HttpClientConfig,
}

impl Default for NebiusConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

pub struct NebiusProvider {
    engine: OpenAiCompatEngine,
}

impl NebiusProvider {
    pub fn new(config: NebiusConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self {
            engine: OpenAiCompatEngine::new(
                Provider::Nebius,
                config.base_url,
                client,
                bearer_auth(),
                CompatQuirks {
                    list_models_prefix: Some(MODEL_ID_PREFIX),
                    ..Default::default()
                },
            ),
        })
    }

    /// Requests may arrive with the namespaced ID; the wire wants the bare
    /// one.
    fn strip_prefix(model: &str) -> &str {
        model.strip_prefix(MODEL_ID_PREFIX).unwrap_or(model)
    }
}

#[async_trait]
impl LlmProvider for NebiusProvider {
    fn provider_key(&self) -> Provider {
        Provider::Nebius
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
            RequestType::TextCompletion,
            RequestType::TextCompletionStream,
            RequestType::Embedding,
            RequestType::ListModels,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        mut request: ChatRequest,
    ) -> Result<ChatResponse> {
        request.model = Self::strip_prefix(&request.model).to_string();
        self.engine.chat(ctx, key, request).await
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        mut request: ChatRequest,
    ) -> Result<ChunkStream> {
        request.model = Self::strip_prefix(&request.model).to_string();
        self.engine.chat_stream(ctx, post_hook, key, request).await
    }

    async fn text_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        mut request: TextCompletionRequest,
    ) -> Result<TextCompletionResponse> {
        request.model = Self::strip_prefix(&request.model).to_string();
        self.engine.text_completion(ctx, key, request).await
    }

    async fn text_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        mut request: TextCompletionRequest,
    ) -> Result<ChunkStream> {
        request.model = Self::strip_prefix(&request.model).to_string();
        self.engine
            .text_completion_stream(ctx, post_hook, key, request)
            .await
    }

    async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        mut request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        request.model = Self::strip_prefix(&request.model).to_string();
        self.engine.embedding(ctx, key, request).await
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
