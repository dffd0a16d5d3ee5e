//! The provider capability contract.
//!
//! Every backend satisfies this trait. Implementations vary wildly in which
//! operations they support; every operation therefore has a default body
//! returning `unsupported_operation` with provider, model, and request type
//! populated, never a half-initialized response. Providers override only
//! what they actually implement.

use async_trait::async_trait;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{CountTokensResponse, Provider, RequestType};
use crate::core::types::completion::{TextCompletionRequest, TextCompletionResponse};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::image::{ImageGenerationRequest, ImageGenerationResponse};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse};
use crate::core::types::rerank::{RerankRequest, RerankResponse};
use crate::core::types::response::ChatResponse;
use crate::core::types::responses_api::{ResponsesRequest, ResponsesResponse};
use crate::core::types::ChunkStream;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Canonical identifier, stamped into every response's extra fields.
    fn provider_key(&self) -> Provider;

    /// Operations this provider implements. Introspection only; gating is
    /// enforced by the default method bodies, not by this list.
    fn capabilities(&self) -> &'static [RequestType] {
        &[]
    }

    async fn chat_completion(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::ChatCompletion,
        ))
    }

    async fn chat_completion_stream(
        &self,
        _ctx: &RequestContext,
        _post_hook: PostHookRunner,
        _key: &crate::core::types::Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::ChatCompletionStream,
        ))
    }

    async fn text_completion(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: TextCompletionRequest,
    ) -> Result<TextCompletionResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::TextCompletion,
        ))
    }

    async fn text_completion_stream(
        &self,
        _ctx: &RequestContext,
        _post_hook: PostHookRunner,
        _key: &crate::core::types::Key,
        request: TextCompletionRequest,
    ) -> Result<ChunkStream> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::TextCompletionStream,
        ))
    }

    async fn responses(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: ResponsesRequest,
    ) -> Result<ResponsesResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::Responses,
        ))
    }

    async fn responses_stream(
        &self,
        _ctx: &RequestContext,
        _post_hook: PostHookRunner,
        _key: &crate::core::types::Key,
        request: ResponsesRequest,
    ) -> Result<ChunkStream> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::ResponsesStream,
        ))
    }

    async fn embedding(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::Embedding,
        ))
    }

    async fn rerank(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: RerankRequest,
    ) -> Result<RerankResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::Rerank,
        ))
    }

    async fn image_generation(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::ImageGeneration,
        ))
    }

    async fn image_generation_stream(
        &self,
        _ctx: &RequestContext,
        _post_hook: PostHookRunner,
        _key: &crate::core::types::Key,
        request: ImageGenerationRequest,
    ) -> Result<ChunkStream> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::ImageGenerationStream,
        ))
    }

    async fn count_tokens(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request: ChatRequest,
    ) -> Result<CountTokensResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            request.model,
            RequestType::CountTokens,
        ))
    }

    async fn list_models(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        _request: ListModelsRequest,
    ) -> Result<ListModelsResponse> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            "",
            RequestType::ListModels,
        ))
    }

    /// Catch-all for operations without a unified schema (image edit and
    /// variation, speech, transcription, files, batches, containers, video).
    /// Payloads pass through as JSON; nothing here implements them yet, so
    /// the default gate applies to all of them.
    async fn extension(
        &self,
        _ctx: &RequestContext,
        _key: &crate::core::types::Key,
        request_type: RequestType,
        model: &str,
        _payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        Err(GatewayError::unsupported(
            self.provider_key(),
            model,
            request_type,
        ))
    }

    /// Release pooled connections and flush provider-owned caches. Called
    /// once; the instance is unusable afterwards.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::errors::ErrorKind;
    use crate::core::types::Key;

    struct Bare;

    #[async_trait]
    impl LlmProvider for Bare {
        fn provider_key(&self) -> Provider {
            Provider::Custom("bare".to_string())
        }
    }

    #[tokio::test]
    async fn test_defaults_gate_every_operation() {
        let provider = Bare;
        let ctx = RequestContext::new();
        let key = Key::new("k");

        let err = provider
            .chat_completion(&ctx, &key, ChatRequest::new(provider.provider_key(), "m"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(err.request_type, Some(RequestType::ChatCompletion));
        assert_eq!(err.model_requested.as_deref(), Some("m"));

        let err = provider
            .rerank(
                &ctx,
                &key,
                crate::core::types::RerankRequest {
                    provider: provider.provider_key(),
                    model: "m".to_string(),
                    query: "q".to_string(),
                    documents: vec![],
                    params: Default::default(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(err.request_type, Some(RequestType::Rerank));

        let err = provider
            .extension(
                &ctx,
                &key,
                RequestType::Speech,
                "m",
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.request_type, Some(RequestType::Speech));
    }
}
