//! SAP AI Core provider implementation.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::config::{normalize_base_url, SapAiCoreConfig, OPENAI_API_VERSION};
use super::responses_stream;
use crate::core::caches::{DeploymentBackend, DeploymentCache, TokenCache};
use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::bedrock::streaming::ConverseStreamConverter;
use crate::core::providers::bedrock::translation as bedrock_translation;
use crate::core::providers::gemini::streaming::convert_generate_frame;
use crate::core::providers::gemini::translation as gemini_translation;
use crate::core::providers::openai_compat::{
    build_chat_payload, convert_chat_frame, parse_chat_response,
};
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport::{self, sse::SseMode};
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::embedding::{EmbeddingRequest, EmbeddingResponse};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::keys::SapAiCoreKeyConfig;
use crate::core::types::response::ChatResponse;
use crate::core::types::responses_api::{
    OutputContent, OutputItem, ResponsesRequest, ResponsesResponse,
};
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::build_http_client;

/// One resolved deployment: everything needed to address it.
struct ResolvedDeployment {
    base_url: String,
    resource_group: String,
    deployment_id: String,
    backend: DeploymentBackend,
    bearer_token: String,
}

pub struct SapAiCoreProvider {
    client: reqwest::Client,
    token_cache: TokenCache,
    deployment_cache: DeploymentCache,
}

impl SapAiCoreProvider {
    pub fn new(config: SapAiCoreConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self {
            client: client.clone(),
            token_cache: TokenCache::new()?,
            deployment_cache: DeploymentCache::new(client, config.deployment_cache_ttl_secs),
        })
    }

    /// Resolve model → deployment. A token pre-fetched by the orchestrator
    /// rides on the context and bypasses the token cache.
    async fn resolve(
        &self,
        ctx: &RequestContext,
        config: &SapAiCoreKeyConfig,
        model: &str,
    ) -> Result<ResolvedDeployment> {
        let base_url = normalize_base_url(&config.base_url);

        let bearer_token = match ctx.sap_auth_token() {
            Some(token) => token,
            None => {
                self.token_cache
                    .get_token(&config.client_id, &config.client_secret, &config.auth_url)
                    .await?
            }
        };

        let (deployment_id, backend) = self
            .deployment_cache
            .get_deployment_id(
                model,
                &config.deployments,
                &base_url,
                &config.resource_group,
                &bearer_token,
            )
            .await?;

        Ok(ResolvedDeployment {
            base_url,
            resource_group: config.resource_group.clone(),
            deployment_id,
            backend,
            bearer_token,
        })
    }

    fn inference_url(resolved: &ResolvedDeployment, suffix: &str) -> String {
        format!(
            "{}/inference/deployments/{}/{}",
            resolved.base_url, resolved.deployment_id, suffix
        )
    }

    fn chat_suffix(backend: DeploymentBackend, model: &str, stream: bool) -> String {
        match backend {
            DeploymentBackend::OpenAi => {
                format!("chat/completions?api-version={}", OPENAI_API_VERSION)
            }
            DeploymentBackend::Bedrock => {
                if stream {
                    "converse-stream".to_string()
                } else {
                    "converse".to_string()
                }
            }
            DeploymentBackend::Vertex => {
                if stream {
                    format!("models/{}:streamGenerateContent?alt=sse", model)
                } else {
                    format!("models/{}:generateContent", model)
                }
            }
        }
    }

    /// Every request carries the resource group alongside the bearer token.
    fn headers(
        resolved: &ResolvedDeployment,
        stream: bool,
    ) -> Result<HeaderMap> {
        let mut pairs = vec![
            ("Authorization", format!("Bearer {}", resolved.bearer_token)),
            ("AI-Resource-Group", resolved.resource_group.clone()),
            ("Content-Type", "application/json".to_string()),
        ];
        if stream {
            let accept = match resolved.backend {
                DeploymentBackend::Bedrock => "application/vnd.amazon.eventstream",
                _ => "text/event-stream",
            };
            pairs.push(("Accept", accept.to_string()));
        }
        transport::build_headers(&pairs)
    }

    fn build_chat_backend_payload(
        backend: DeploymentBackend,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<serde_json::Value> {
        match backend {
            DeploymentBackend::OpenAi => {
                build_chat_payload(&request.model, &request.input, &request.params, stream)
            }
            DeploymentBackend::Bedrock => {
                bedrock_translation::build_converse_payload(&request.input, &request.params)
            }
            DeploymentBackend::Vertex => {
                gemini_translation::build_generate_content_payload(&request.input, &request.params)
            }
        }
    }

    fn stamp_deployment<T>(response: &mut T, resolved: &ResolvedDeployment)
    where
        T: AsExtraFields,
    {
        response.extra_fields_mut().model_deployment = Some(resolved.deployment_id.clone());
    }
}

/// Internal helper so deployment stamping works across response kinds.
trait AsExtraFields {
    fn extra_fields_mut(&mut self) -> &mut crate::core::types::common::ResponseExtraFields;
}

impl AsExtraFields for ChatResponse {
    fn extra_fields_mut(&mut self) -> &mut crate::core::types::common::ResponseExtraFields {
        &mut self.extra_fields
    }
}

impl AsExtraFields for ResponsesResponse {
    fn extra_fields_mut(&mut self) -> &mut crate::core::types::common::ResponseExtraFields {
        &mut self.extra_fields
    }
}

impl AsExtraFields for EmbeddingResponse {
    fn extra_fields_mut(&mut self) -> &mut crate::core::types::common::ResponseExtraFields {
        &mut self.extra_fields
    }
}

#[async_trait]
impl LlmProvider for SapAiCoreProvider {
    fn provider_key(&self) -> Provider {
        Provider::SapAiCore
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
            RequestType::Responses,
            RequestType::ResponsesStream,
            RequestType::Embedding,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let config = key.sap_ai_core_config()?;
        let resolved = self.resolve(ctx, config, &request.model).await?;
        let payload = Self::build_chat_backend_payload(resolved.backend, &request, false)?;
        let suffix = Self::chat_suffix(resolved.backend, &request.model, false);
        let url = Self::inference_url(&resolved, &suffix);
        let body = transport::post_json(
            &self.client,
            &Provider::SapAiCore,
            &url,
            Self::headers(&resolved, false)?,
            &payload,
        )
        .await?;

        let mut response = match resolved.backend {
            DeploymentBackend::OpenAi => parse_chat_response(ctx, &body)?,
            DeploymentBackend::Bedrock => {
                bedrock_translation::parse_converse_response(ctx, &request.model, &body)?
            }
            DeploymentBackend::Vertex => {
                gemini_translation::parse_generate_content_response(ctx, &request.model, &body)?
            }
        };
        Self::stamp_deployment(&mut response, &resolved);
        Ok(response)
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        let config = key.sap_ai_core_config()?;
        let resolved = self.resolve(ctx, config, &request.model).await?;
        let payload = Self::build_chat_backend_payload(resolved.backend, &request, true)?;
        let suffix = Self::chat_suffix(resolved.backend, &request.model, true);
        let url = Self::inference_url(&resolved, &suffix);
        let response = transport::post_stream(
            &self.client,
            &Provider::SapAiCore,
            &url,
            Self::headers(&resolved, true)?,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            Provider::SapAiCore,
            request.model.clone(),
            RequestType::ChatCompletionStream,
            StreamState::new(request.model.clone()),
        );

        match resolved.backend {
            DeploymentBackend::OpenAi => {
                tokio::spawn(streaming::drive_sse(
                    response,
                    SseMode::DataOnly,
                    emitter,
                    convert_chat_frame,
                    |_state| Vec::new(),
                ));
            }
            DeploymentBackend::Vertex => {
                tokio::spawn(streaming::drive_sse(
                    response,
                    SseMode::DataOnly,
                    emitter,
                    convert_generate_frame,
                    |_state| Vec::new(),
                ));
            }
            DeploymentBackend::Bedrock => {
                let mut converter = ConverseStreamConverter::new();
                tokio::spawn(streaming::drive_eventstream(
                    response,
                    emitter,
                    move |state, frame| converter.convert(state, frame),
                    |_state| Vec::new(),
                ));
            }
        }
        Ok(stream)
    }

    async fn responses(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ResponsesRequest,
    ) -> Result<ResponsesResponse> {
        // Gateway backends have no native responses endpoint; run the chat
        // translation for the deployment's backend and lift the result.
        let chat_request = responses_to_chat_request(&request)?;
        let chat_response = self.chat_completion(ctx, key, chat_request).await?;

        let output = chat_response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|content| {
                vec![OutputItem::Message {
                    id: Some(format!("msg_{}", chat_response.id)),
                    role: "assistant".to_string(),
                    status: Some("completed".to_string()),
                    content: vec![OutputContent::OutputText {
                        text: content.as_text(),
                        annotations: Vec::new(),
                        thought_signature: None,
                    }],
                }]
            })
            .unwrap_or_default();

        Ok(ResponsesResponse {
            id: chat_response.id,
            object: "response".to_string(),
            created_at: chat_response.created,
            status: "completed".to_string(),
            model: chat_response.model,
            output,
            usage: chat_response.usage,
            stop_reason: chat_response
                .choices
                .first()
                .and_then(|choice| choice.finish_reason.clone()),
            extra_fields: chat_response.extra_fields,
        })
    }

    async fn responses_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ResponsesRequest,
    ) -> Result<ChunkStream> {
        let config = key.sap_ai_core_config()?;
        let resolved = self.resolve(ctx, config, &request.model).await?;
        let chat_request = responses_to_chat_request(&request)?;
        let payload = Self::build_chat_backend_payload(resolved.backend, &chat_request, true)?;
        let suffix = Self::chat_suffix(resolved.backend, &request.model, true);
        let url = Self::inference_url(&resolved, &suffix);
        let response = transport::post_stream(
            &self.client,
            &Provider::SapAiCore,
            &url,
            Self::headers(&resolved, true)?,
            &payload,
        )
        .await?;

        let (tx, stream) = streaming::open_channel();
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            Provider::SapAiCore,
            request.model.clone(),
            RequestType::ResponsesStream,
            StreamState::new(request.model.clone()),
        );

        match resolved.backend {
            DeploymentBackend::Bedrock => {
                tokio::spawn(streaming::drive_eventstream(
                    response,
                    emitter,
                    responses_stream::convert_bedrock_frame,
                    responses_stream::close_lifecycle,
                ));
            }
            DeploymentBackend::Vertex => {
                tokio::spawn(streaming::drive_sse(
                    response,
                    SseMode::DataOnly,
                    emitter,
                    responses_stream::convert_vertex_frame,
                    responses_stream::close_lifecycle,
                ));
            }
            DeploymentBackend::OpenAi => {
                tokio::spawn(streaming::drive_sse(
                    response,
                    SseMode::DataOnly,
                    emitter,
                    responses_stream::convert_openai_frame,
                    responses_stream::close_lifecycle,
                ));
            }
        }
        Ok(stream)
    }

    async fn embedding(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse> {
        let config = key.sap_ai_core_config()?;
        let resolved = self.resolve(ctx, config, &request.model).await?;
        if resolved.backend != DeploymentBackend::OpenAi {
            return Err(GatewayError::unsupported(
                Provider::SapAiCore,
                request.model,
                RequestType::Embedding,
            ));
        }

        let payload = serde_json::json!({ "input": request.input });
        let url = Self::inference_url(
            &resolved,
            &format!("embeddings?api-version={}", OPENAI_API_VERSION),
        );
        let body = transport::post_json(
            &self.client,
            &Provider::SapAiCore,
            &url,
            Self::headers(&resolved, false)?,
            &payload,
        )
        .await?;
        let mut response: EmbeddingResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed embedding response: {}", e)))?;
        crate::core::providers::openai_compat::attach_raw(ctx, &mut response.extra_fields, &body);
        Self::stamp_deployment(&mut response, &resolved);
        Ok(response)
    }

    async fn shutdown(&self) -> Result<()> {
        self.token_cache.clear_all().await;
        self.deployment_cache.clear_cache("", "").await;
        Ok(())
    }
}

/// Reduce a responses request to the chat shape the backends speak.
fn responses_to_chat_request(request: &ResponsesRequest) -> Result<ChatRequest> {
    use crate::core::types::chat::{ChatMessage, ChatParams};
    use crate::core::types::responses_api::ResponsesInput;

    let input = match &request.input {
        ResponsesInput::Text(text) => vec![ChatMessage::user(text.clone())],
        ResponsesInput::Items(items) => {
            let mut messages = Vec::new();
            for item in items {
                if let OutputItem::Message { role, content, .. } = item {
                    let text: String = content
                        .iter()
                        .filter_map(|block| match block {
                            OutputContent::OutputText { text, .. } => Some(text.as_str()),
                            OutputContent::InputText { text } => Some(text.as_str()),
                            OutputContent::Refusal { .. } => None,
                        })
                        .collect();
                    let message = match role.as_str() {
                        "system" => ChatMessage::system(text),
                        "assistant" => ChatMessage::assistant(text),
                        _ => ChatMessage::user(text),
                    };
                    messages.push(message);
                }
            }
            messages
        }
    };
    if input.is_empty() {
        return Err(GatewayError::operation("responses input must not be empty"));
    }

    Ok(ChatRequest {
        provider: request.provider.clone(),
        model: request.model.clone(),
        input,
        params: ChatParams {
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_completion_tokens: request.params.max_output_tokens,
            tools: request.params.tools.clone(),
            tool_choice: request.params.tool_choice.clone(),
            ..Default::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::responses_api::ResponsesParams;
    use std::collections::HashMap;

    fn resolved(backend: DeploymentBackend) -> ResolvedDeployment {
        ResolvedDeployment {
            base_url: "https://host/v2".to_string(),
            resource_group: "default".to_string(),
            deployment_id: "d42".to_string(),
            backend,
            bearer_token: "tok".to_string(),
        }
    }

    #[test]
    fn test_bedrock_stream_url_shape() {
        let resolved = resolved(DeploymentBackend::Bedrock);
        let suffix = SapAiCoreProvider::chat_suffix(
            resolved.backend,
            "anthropic--claude-3-sonnet",
            true,
        );
        assert_eq!(
            SapAiCoreProvider::inference_url(&resolved, &suffix),
            "https://host/v2/inference/deployments/d42/converse-stream"
        );
    }

    #[test]
    fn test_openai_suffix_carries_api_version() {
        let suffix = SapAiCoreProvider::chat_suffix(DeploymentBackend::OpenAi, "gpt-4o", false);
        assert_eq!(suffix, "chat/completions?api-version=2024-12-01-preview");
    }

    #[test]
    fn test_vertex_suffixes() {
        assert_eq!(
            SapAiCoreProvider::chat_suffix(DeploymentBackend::Vertex, "gemini-1.5-pro", false),
            "models/gemini-1.5-pro:generateContent"
        );
        assert_eq!(
            SapAiCoreProvider::chat_suffix(DeploymentBackend::Vertex, "gemini-1.5-pro", true),
            "models/gemini-1.5-pro:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_headers_carry_resource_group_and_accept() {
        let resolved = resolved(DeploymentBackend::Bedrock);
        let headers = SapAiCoreProvider::headers(&resolved, true).unwrap();
        assert_eq!(headers.get("AI-Resource-Group").unwrap(), "default");
        assert_eq!(
            headers.get("Accept").unwrap(),
            "application/vnd.amazon.eventstream"
        );
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer tok");
    }

    #[test]
    fn test_responses_to_chat_reduction() {
        let request = ResponsesRequest {
            provider: Provider::SapAiCore,
            model: "anthropic--claude-3-sonnet".to_string(),
            input: crate::core::types::responses_api::ResponsesInput::Text("hi".to_string()),
            params: ResponsesParams {
                max_output_tokens: Some(128),
                ..Default::default()
            },
        };
        let chat = responses_to_chat_request(&request).unwrap();
        assert_eq!(chat.input.len(), 1);
        assert_eq!(chat.params.max_completion_tokens, Some(128));
    }

    #[tokio::test]
    async fn test_static_deployment_resolution() {
        let provider = SapAiCoreProvider::new(SapAiCoreConfig::default()).unwrap();
        let mut deployments = HashMap::new();
        deployments.insert("anthropic--claude-3-sonnet".to_string(), "d42".to_string());
        let config = SapAiCoreKeyConfig {
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            auth_url: "https://auth.invalid".to_string(),
            base_url: "https://host".to_string(),
            resource_group: "default".to_string(),
            deployments,
        };
        // Pre-fetched token on the context avoids the token endpoint; the
        // static map avoids the catalog endpoint.
        let ctx = RequestContext::new().with_value(
            crate::core::context::SAP_AI_CORE_AUTH_TOKEN_KEY,
            serde_json::json!("tok"),
        );
        let resolved = provider
            .resolve(&ctx, &config, "anthropic--claude-3-sonnet")
            .await
            .unwrap();
        assert_eq!(resolved.deployment_id, "d42");
        assert_eq!(resolved.backend, DeploymentBackend::Bedrock);
        assert_eq!(resolved.base_url, "https://host/v2");
    }
}
