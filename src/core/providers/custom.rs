//! Arbitrary OpenAI-compatible endpoint.
//!
//! For self-hosted or aggregator backends that speak the OpenAI format but
//! aren't in the built-in family: the caller names the provider and points
//! it at a base URL.

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
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, validate_url, HttpClientConfig};

#[derive(Debug, Clone)]
pub struct CustomProviderConfig {
    /// Caller-chosen identifier, stamped into responses.
    pub name: String,
    pub base_url: String,
    pub http: HttpClientConfig,
}

impl CustomProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http: HttpClientConfig::default(),
        }
    }
}

pub struct CustomProvider {
    provider: Provider,
    engine: OpenAiCompatEngine,
}

impl CustomProvider {
    pub fn new(config: CustomProviderConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(GatewayError::operation("custom provider requires a name"));
        }
        validate_url(&config.base_url)?;
        let client = build_http_client(&config.http)?;
        let provider = Provider::Custom(config.name.clone());
        Ok(Self {
            provider: provider.clone(),
            engine: OpenAiCompatEngine::new(
                provider,
                config.base_url,
                client,
                bearer_auth(),
                CompatQuirks::default(),
            ),
        })
    }
}

#[async_trait]
impl LlmProvider for CustomProvider {
    fn provider_key(&self) -> Provider {
        self.provider.clone()
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

    async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_valid_url() {
        assert!(CustomProvider::new(CustomProviderConfig::new("local", "not-a-url")).is_err());
        assert!(
            CustomProvider::new(CustomProviderConfig::new("local", "http://localhost:8000/v1"))
                .is_ok()
        );
    }

    #[test]
    fn test_identity_stamp() {
        let provider =
            CustomProvider::new(CustomProviderConfig::new("vllm", "http://localhost:8000/v1"))
                .unwrap();
        assert_eq!(provider.provider_key(), Provider::Custom("vllm".to_string()));
    }
}
