//! HuggingFace provider.
//!
//! Inference rides the OpenAI-compatible router; model listing queries the
//! hub API directly and derives each model's supported operations from its
//! pipeline tag.

use async_trait::async_trait;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::{
    attach_raw, bearer_auth, CompatQuirks, OpenAiCompatEngine,
};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport;
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType, DEFAULT_PAGE_SIZE};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse, ModelEntry};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, HttpClientConfig};

pub const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/v1";

pub const HUB_MODELS_URL: &str = "https://huggingface.co/api/models";

/// Hub model IDs are namespaced on the way out.
pub const MODEL_ID_PREFIX: &str = "huggingface/";

/// Which operations a hub pipeline tag supports.
pub fn supported_methods(pipeline_tag: &str) -> &'static [RequestType] {
    match pipeline_tag {
        "text-generation" | "image-text-to-text" | "conversational" => &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
        ],
        "feature-extraction" | "sentence-similarity" => &[RequestType::Embedding],
        "text-to-image" => &[RequestType::ImageGeneration],
        "automatic-speech-recognition" => &[RequestType::Transcription],
        "text-to-speech" => &[RequestType::Speech],
        _ => &[],
    }
}

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub base_url: String,
    pub hub_url: String,
    pub http: HttpClientConfig,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            hub_url: HUB_MODELS_URL.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

pub struct HuggingFaceProvider {
    engine: OpenAiCompatEngine,
    hub_url: String,
}

impl HuggingFaceProvider {
    pub fn new(config: HuggingFaceConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self {
            engine: OpenAiCompatEngine::new(
                Provider::HuggingFace,
                config.base_url,
                client,
                bearer_auth(),
                CompatQuirks::default(),
            ),
            hub_url: config.hub_url,
        })
    }

    fn strip_prefix(model: &str) -> &str {
        model.strip_prefix(MODEL_ID_PREFIX).unwrap_or(model)
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    fn provider_key(&self) -> Provider {
        Provider::HuggingFace
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
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
        let url = format!(
            "{}?inference_provider=hf-inference&limit={}&full=1&sort=likes&direction=-1",
            self.hub_url,
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
        );
        let headers = transport::build_headers(&[(
            "Authorization",
            format!("Bearer {}", key.value),
        )])?;
        let body =
            transport::get_json(&self.engine.client, &Provider::HuggingFace, &url, headers)
                .await?;
        let models: Vec<serde_json::Value> = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed hub listing: {}", e)))?;

        let data = models
            .iter()
            .filter_map(|m| {
                let id = m.get("id")?.as_str()?;
                let pipeline_tag = m
                    .get("pipeline_tag")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default();
                // Models with no mappable operation aren't routable here.
                if supported_methods(pipeline_tag).is_empty() {
                    return None;
                }
                Some(ModelEntry {
                    id: format!("{}{}", MODEL_ID_PREFIX, id),
                    object: "model".to_string(),
                    created: None,
                    owned_by: id.split('/').next().map(str::to_string),
                })
            })
            .collect();

        let mut response = ListModelsResponse {
            object: "list".to_string(),
            data,
            next_page_token: None,
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_tag_mapping() {
        assert!(supported_methods("text-generation").contains(&RequestType::ChatCompletion));
        assert!(supported_methods("feature-extraction").contains(&RequestType::Embedding));
        assert!(supported_methods("text-to-image").contains(&RequestType::ImageGeneration));
        assert!(supported_methods("object-detection").is_empty());
    }

    #[test]
    fn test_prefix_stripping() {
        assert_eq!(
            HuggingFaceProvider::strip_prefix("huggingface/meta-llama/Llama-3.1-8B"),
            "meta-llama/Llama-3.1-8B"
        );
    }
}
