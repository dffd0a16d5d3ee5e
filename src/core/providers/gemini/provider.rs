//! Gemini (AI Studio) provider implementation.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::config::GeminiConfig;
use super::streaming::convert_generate_frame;
use super::translation;
use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport::{self, sse::SseMode};
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::embedding::{
    EmbeddingData, EmbeddingRequest, EmbeddingResponse,
};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse, ModelEntry};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, join_url};

pub struct GeminiProvider {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self { config, client })
    }

    fn headers(&self, key: &Key) -> Result<HeaderMap> {
        transport::build_headers(&[
            ("x-goog-api-key", key.value.clone()),
            ("Content-Type", "application/json".to_string()),
        ])
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_key(&self) -> Provider {
        Provider::Gemini
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
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let payload =
            translation::build_generate_content_payload(&request.input, &request.params)?;
        let url = join_url(
            &self.config.base_url,
            &format!("models/{}:generateContent", request.model),
        );
        let body = transport::post_json(
            &self.client,
            &Provider::Gemini,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        translation::parse_generate_content_response(ctx, &request.model, &body)
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        let payload =
            translation::build_generate_content_payload(&request.input, &request.params)?;
        let url = join_url(
            &self.config.base_url,
            &format!("models/{}:streamGenerateContent?alt=sse", request.model),
        );
        let response = transport::post_stream(
            &self.client,
            &Provider::Gemini,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            Provider::Gemini,
            request.model.clone(),
            RequestType::ChatCompletionStream,
            StreamState::new(request.model.clone()),
        );
        tokio::spawn(streaming::drive_sse(
            response,
            SseMode::DataOnly,
            emitter,
            convert_generate_frame,
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
        let requests: Vec<serde_json::Value> = request
            .input
            .texts()
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", request.model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        let payload = serde_json::json!({ "requests": requests });

        let url = join_url(
            &self.config.base_url,
            &format!("models/{}:batchEmbedContents", request.model),
        );
        let body = transport::post_json(
            &self.client,
            &Provider::Gemini,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed embedding response: {}", e)))?;

        let data = value
            .get("embeddings")
            .and_then(|e| e.as_array())
            .map(|embeddings| {
                embeddings
                    .iter()
                    .enumerate()
                    .map(|(index, e)| EmbeddingData {
                        object: "embedding".to_string(),
                        index: index as u32,
                        embedding: e
                            .get("values")
                            .and_then(|v| v.as_array())
                            .map(|values| {
                                values
                                    .iter()
                                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut response = EmbeddingResponse {
            object: "list".to_string(),
            data,
            model: request.model,
            usage: None,
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
        let mut url = join_url(&self.config.base_url, "models");
        if let Some(token) = &request.page_token {
            url.push_str(&format!("?pageToken={}", token));
        }
        let body =
            transport::get_json(&self.client, &Provider::Gemini, &url, self.headers(key)?).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed model list: {}", e)))?;

        let data = value
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        let name = m.get("name")?.as_str()?;
                        Some(ModelEntry {
                            id: name.strip_prefix("models/").unwrap_or(name).to_string(),
                            object: "model".to_string(),
                            created: None,
                            owned_by: Some("google".to_string()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut response = ListModelsResponse {
            object: "list".to_string(),
            data,
            next_page_token: value
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}
