//! Cohere provider implementation.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::core::context::RequestContext;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::traits::provider::LlmProvider;
use crate::core::transport;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::embedding::{EmbeddingData, EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse, ModelEntry};
use crate::core::types::rerank::{
    sort_results, RerankDocument, RerankRequest, RerankResponse, RerankResult, RerankUsage,
};
use crate::core::types::Key;
use crate::utils::net::{build_http_client, join_url, HttpClientConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.cohere.com";

#[derive(Debug, Clone)]
pub struct CohereConfig {
    pub base_url: String,
    pub http: HttpClientConfig,
}

impl Default for CohereConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

pub struct CohereProvider {
    config: CohereConfig,
    client: reqwest::Client,
}

impl CohereProvider {
    pub fn new(config: CohereConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self { config, client })
    }

    fn headers(&self, key: &Key) -> Result<HeaderMap> {
        transport::build_headers(&[
            ("Authorization", format!("Bearer {}", key.value)),
            ("Content-Type", "application/json".to_string()),
        ])
    }
}

/// Text-only documents are sent as plain strings; anything carrying an ID
/// or metadata is JSON-encoded so nothing is dropped on the wire.
fn encode_document(document: &RerankDocument) -> serde_json::Value {
    if document.is_plain() {
        return serde_json::Value::String(document.text.clone());
    }
    let mut encoded = serde_json::json!({ "text": document.text });
    if let Some(id) = &document.id {
        encoded["id"] = id.clone().into();
    }
    if let Some(meta) = &document.meta {
        encoded["metadata"] = serde_json::to_value(meta).unwrap_or_default();
    }
    serde_json::Value::String(encoded.to_string())
}

#[async_trait]
impl LlmProvider for CohereProvider {
    fn provider_key(&self) -> Provider {
        Provider::Cohere
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::Rerank,
            RequestType::Embedding,
            RequestType::ListModels,
        ]
    }

    async fn rerank(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: RerankRequest,
    ) -> Result<RerankResponse> {
        if request.documents.is_empty() {
            return Err(GatewayError::operation("rerank documents must not be empty"));
        }

        let documents: Vec<serde_json::Value> =
            request.documents.iter().map(encode_document).collect();
        let mut payload = serde_json::json!({
            "model": request.model,
            "query": request.query,
            "documents": documents,
        });
        if let Some(top_n) = request.params.top_n {
            // Asking for more results than documents is a client slip, not
            // an upstream error.
            payload["top_n"] = top_n.min(request.documents.len()).into();
        }
        if let Some(max_tokens) = request.params.max_tokens_per_doc {
            payload["max_tokens_per_doc"] = max_tokens.into();
        }

        let url = join_url(&self.config.base_url, "v2/rerank");
        let body = transport::post_json(
            &self.client,
            &Provider::Cohere,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed rerank response: {}", e)))?;

        let mut results: Vec<RerankResult> = value
            .get("results")
            .and_then(|r| r.as_array())
            .map(|results| {
                results
                    .iter()
                    .map(|r| {
                        let index =
                            r.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32;
                        RerankResult {
                            index,
                            relevance_score: r
                                .get("relevance_score")
                                .and_then(|s| s.as_f64())
                                .unwrap_or(0.0),
                            document: request.documents.get(index as usize).cloned(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        sort_results(&mut results);

        let usage = value.pointer("/meta/billed_units").map(|units| RerankUsage {
            total_tokens: units
                .get("input_tokens")
                .and_then(|t| t.as_u64())
                .map(|t| t as u32),
            search_units: units
                .get("search_units")
                .and_then(|s| s.as_u64())
                .map(|s| s as u32),
        });

        let mut response = RerankResponse {
            id: value
                .get("id")
                .and_then(|i| i.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("rerank-{}", uuid::Uuid::new_v4())),
            results,
            usage,
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }

    async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let payload = serde_json::json!({
            "model": request.model,
            "texts": request.input.texts(),
            "input_type": "search_document",
            "embedding_types": ["float"],
        });
        let url = join_url(&self.config.base_url, "v2/embed");
        let body = transport::post_json(
            &self.client,
            &Provider::Cohere,
            &url,
            self.headers(key)?,
            &payload,
        )
        .await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed embed response: {}", e)))?;

        let data = value
            .pointer("/embeddings/float")
            .and_then(|e| e.as_array())
            .map(|embeddings| {
                embeddings
                    .iter()
                    .enumerate()
                    .map(|(index, embedding)| EmbeddingData {
                        object: "embedding".to_string(),
                        index: index as u32,
                        embedding: embedding
                            .as_array()
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
        let mut url = join_url(&self.config.base_url, "v1/models");
        if let Some(size) = request.page_size {
            url.push_str(&format!("?page_size={}", size));
        }
        let body =
            transport::get_json(&self.client, &Provider::Cohere, &url, self.headers(key)?).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed model list: {}", e)))?;

        let data = value
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        Some(ModelEntry {
                            id: m.get("name")?.as_str()?.to_string(),
                            object: "model".to_string(),
                            created: None,
                            owned_by: Some("cohere".to_string()),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut response = ListModelsResponse {
            object: "list".to_string(),
            data,
            next_page_token: value
                .get("next_page_token")
                .and_then(|t| t.as_str())
                .map(str::to_string),
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}
