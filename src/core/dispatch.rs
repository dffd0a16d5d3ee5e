//! Request dispatch.
//!
//! Holds the provider registry, pattern-matches on the request kind, stamps
//! gateway metadata onto whatever comes back, and normalizes every failure
//! into the error envelope. No routing policy lives here: which key to use
//! and whether to retry elsewhere are the orchestrator's decisions.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::traits::provider::LlmProvider;
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, GatewayRequest, GatewayResponse, Key};

#[derive(Default)]
pub struct Dispatcher {
    providers: DashMap<Provider, Arc<dyn LlmProvider>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Register a provider under its canonical key. Re-registering replaces
    /// the previous instance.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.provider_key(), provider);
    }

    pub fn provider(&self, key: &Provider) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(key).map(|entry| entry.value().clone())
    }

    fn resolve(
        &self,
        key: &Provider,
        model: &str,
        request_type: RequestType,
    ) -> Result<Arc<dyn LlmProvider>> {
        self.provider(key)
            .ok_or_else(|| GatewayError::unsupported(key.clone(), model, request_type))
    }

    /// Execute a unary request. The first error short-circuits and comes
    /// back with provider, model, and request type always populated.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: GatewayRequest,
    ) -> Result<GatewayResponse> {
        request.validate()?;

        let provider_key = request.provider().clone();
        let model = request.model().to_string();
        let request_type = request.request_type();
        let provider = self.resolve(&provider_key, &model, request_type)?;

        debug!(provider = %provider_key, model = %model, request_type = %request_type, "dispatching");
        let started = Instant::now();

        let result = match request {
            GatewayRequest::Chat(r) => provider
                .chat_completion(ctx, key, r)
                .await
                .map(GatewayResponse::Chat),
            GatewayRequest::Responses(r) => provider
                .responses(ctx, key, r)
                .await
                .map(GatewayResponse::Responses),
            GatewayRequest::TextCompletion(r) => provider
                .text_completion(ctx, key, r)
                .await
                .map(GatewayResponse::TextCompletion),
            GatewayRequest::Embedding(r) => provider
                .embedding(ctx, key, r)
                .await
                .map(GatewayResponse::Embedding),
            GatewayRequest::ImageGeneration(r) => provider
                .image_generation(ctx, key, r)
                .await
                .map(GatewayResponse::ImageGeneration),
            GatewayRequest::Rerank(r) => provider
                .rerank(ctx, key, r)
                .await
                .map(GatewayResponse::Rerank),
            GatewayRequest::ListModels(r) => provider
                .list_models(ctx, key, r)
                .await
                .map(GatewayResponse::ListModels),
        };

        match result {
            Ok(mut response) => {
                let extra = response.extra_fields_mut();
                extra.provider = Some(provider_key);
                if extra.model_requested.is_none() {
                    extra.model_requested = Some(model);
                }
                if extra.request_type.is_none() {
                    extra.request_type = Some(request_type);
                }
                extra.latency_ms = Some(started.elapsed().as_millis() as u64);
                Ok(response)
            }
            Err(err) => Err(err.contextualize(&provider_key, &model, request_type)),
        }
    }

    /// Execute a streaming request. Pre-flight failures return
    /// synchronously; once a stream exists, failures arrive as a single
    /// terminal error chunk before the channel closes.
    pub async fn execute_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: GatewayRequest,
    ) -> Result<ChunkStream> {
        request.validate()?;

        let provider_key = request.provider().clone();
        let model = request.model().to_string();
        let request_type = match &request {
            GatewayRequest::Chat(_) => RequestType::ChatCompletionStream,
            GatewayRequest::TextCompletion(_) => RequestType::TextCompletionStream,
            GatewayRequest::Responses(_) => RequestType::ResponsesStream,
            GatewayRequest::ImageGeneration(_) => RequestType::ImageGenerationStream,
            other => {
                return Err(GatewayError::operation(format!(
                    "operation {} does not stream",
                    other.request_type()
                ))
                .with_provider(provider_key)
                .with_model(model)
                .with_request_type(other.request_type()));
            }
        };
        let provider = self.resolve(&provider_key, &model, request_type)?;

        debug!(provider = %provider_key, model = %model, request_type = %request_type, "dispatching stream");

        let result = match request {
            GatewayRequest::Chat(r) => {
                provider
                    .chat_completion_stream(ctx, post_hook, key, r)
                    .await
            }
            GatewayRequest::TextCompletion(r) => {
                provider
                    .text_completion_stream(ctx, post_hook, key, r)
                    .await
            }
            GatewayRequest::Responses(r) => {
                provider.responses_stream(ctx, post_hook, key, r).await
            }
            GatewayRequest::ImageGeneration(r) => {
                provider
                    .image_generation_stream(ctx, post_hook, key, r)
                    .await
            }
            _ => unreachable!("non-streaming kinds rejected above"),
        };

        result.map_err(|err| err.contextualize(&provider_key, &model, request_type))
    }

    /// Convenience wrapper for the most common call.
    pub async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        match self.execute(ctx, key, GatewayRequest::Chat(request)).await? {
            GatewayResponse::Chat(response) => Ok(response),
            _ => Err(GatewayError::operation("dispatch returned mismatched response kind")),
        }
    }

    /// Shut down every registered provider, releasing clients and caches.
    pub async fn shutdown(&self) {
        for entry in self.providers.iter() {
            if let Err(err) = entry.value().shutdown().await {
                tracing::warn!(provider = %entry.key(), error = %err, "provider shutdown failed");
            }
        }
        self.providers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hooks::noop_post_hook;
    use crate::core::types::chat::ChatMessage;
    use crate::core::types::errors::ErrorKind;

    #[tokio::test]
    async fn test_unknown_provider_is_unsupported() {
        let dispatcher = Dispatcher::new();
        let ctx = RequestContext::new();
        let request = GatewayRequest::Chat(
            ChatRequest::new(Provider::Anthropic, "claude-3").message(ChatMessage::user("hi")),
        );
        let err = dispatcher
            .execute(&ctx, &Key::new("k"), request)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(err.provider, Some(Provider::Anthropic));
        assert_eq!(err.model_requested.as_deref(), Some("claude-3"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_resolution() {
        let dispatcher = Dispatcher::new();
        let ctx = RequestContext::new();
        let request = GatewayRequest::Chat(ChatRequest::new(Provider::OpenAi, "gpt-4o"));
        let err = dispatcher
            .execute(&ctx, &Key::new("k"), request)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationError);
    }

    #[tokio::test]
    async fn test_non_streamable_kind_rejected() {
        let dispatcher = Dispatcher::new();
        let ctx = RequestContext::new();
        let request = GatewayRequest::Rerank(crate::core::types::RerankRequest {
            provider: Provider::Cohere,
            model: "rerank-v3.5".to_string(),
            query: "q".to_string(),
            documents: vec![crate::core::types::RerankDocument::text("d")],
            params: Default::default(),
        });
        let err = dispatcher
            .execute_stream(&ctx, noop_post_hook(), &Key::new("k"), request)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationError);
    }
}
