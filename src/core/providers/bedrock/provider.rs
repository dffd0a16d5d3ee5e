//! Bedrock provider implementation.
//!
//! Authenticates either with a bearer API key (when the key value is set)
//! or with SigV4 over the IAM credentials in the key config.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;

use super::config::BedrockConfig;
use super::sigv4::SigV4Signer;
use super::streaming::ConverseStreamConverter;
use super::translation;
use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::attach_raw;
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport;
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::model_list::{ListModelsRequest, ListModelsResponse, ModelEntry};
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::build_http_client;

pub struct BedrockProvider {
    config: BedrockConfig,
    client: reqwest::Client,
}

impl BedrockProvider {
    pub fn new(config: BedrockConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self { config, client })
    }

    fn region<'a>(&'a self, key: &'a Key) -> &'a str {
        match &key.config {
            Some(crate::core::types::KeyConfig::Bedrock(config)) => &config.region,
            _ => &self.config.region,
        }
    }

    /// Build the headers for one signed (or bearer-authed) request.
    fn auth_headers(
        &self,
        key: &Key,
        method: &str,
        url: &str,
        body: &[u8],
        accept: Option<&str>,
    ) -> Result<HeaderMap> {
        let mut pairs: Vec<(&str, String)> =
            vec![("content-type", "application/json".to_string())];
        if let Some(accept) = accept {
            pairs.push(("accept", accept.to_string()));
        }

        if !key.value.is_empty() {
            pairs.push(("authorization", format!("Bearer {}", key.value)));
            return transport::build_headers(&pairs);
        }

        let config = key.bedrock_config()?;
        let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) else {
            return Err(GatewayError::auth(
                "bedrock key requires either a token value or IAM credentials",
            ));
        };
        let signer = SigV4Signer::new(
            access_key.clone(),
            secret_key.clone(),
            config.session_token.clone(),
            config.region.clone(),
        );
        let signed = signer.sign_request(method, url, &pairs, body, Utc::now())?;
        let owned: Vec<(&str, String)> = signed
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        transport::build_headers(&owned)
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn provider_key(&self) -> Provider {
        Provider::Bedrock
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
            RequestType::ListModels,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let payload = translation::build_converse_payload(&request.input, &request.params)?;
        let body = serde_json::to_vec(&payload)?;
        let region = self.region(key).to_string();
        let url = format!(
            "{}/model/{}/converse",
            self.config.runtime_url(&region),
            request.model
        );
        let headers = self.auth_headers(key, "POST", &url, &body, None)?;
        let response_body =
            transport::post_bytes(&self.client, &Provider::Bedrock, &url, headers, body).await?;
        translation::parse_converse_response(ctx, &request.model, &response_body)
    }

    async fn chat_completion_stream(
        &self,
        ctx: &RequestContext,
        post_hook: PostHookRunner,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChunkStream> {
        let payload = translation::build_converse_payload(&request.input, &request.params)?;
        let body = serde_json::to_vec(&payload)?;
        let region = self.region(key).to_string();
        let url = format!(
            "{}/model/{}/converse-stream",
            self.config.runtime_url(&region),
            request.model
        );
        let headers = self.auth_headers(
            key,
            "POST",
            &url,
            &body,
            Some("application/vnd.amazon.eventstream"),
        )?;
        let response =
            transport::post_bytes_stream(&self.client, &Provider::Bedrock, &url, headers, body)
                .await?;

        let (tx, stream) = streaming::open_channel();
        let mut state = StreamState::new(request.model.clone());
        state.message_id = format!("bedrock-{}", uuid::Uuid::new_v4());
        let emitter = StreamEmitter::new(
            tx,
            ctx.clone(),
            post_hook,
            Provider::Bedrock,
            request.model.clone(),
            RequestType::ChatCompletionStream,
            state,
        );
        let mut converter = ConverseStreamConverter::new();
        tokio::spawn(streaming::drive_eventstream(
            response,
            emitter,
            move |state, frame| converter.convert(state, frame),
            |_state| Vec::new(),
        ));
        Ok(stream)
    }

    async fn list_models(
        &self,
        ctx: &RequestContext,
        key: &Key,
        _request: ListModelsRequest,
    ) -> Result<ListModelsResponse> {
        let region = self.region(key).to_string();
        let url = format!("{}/foundation-models", self.config.control_url(&region));
        let headers = self.auth_headers(key, "GET", &url, b"", None)?;
        let body =
            transport::get_json(&self.client, &Provider::Bedrock, &url, headers).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed model list: {}", e)))?;

        let data = value
            .get("modelSummaries")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        Some(ModelEntry {
                            id: m.get("modelId")?.as_str()?.to_string(),
                            object: "model".to_string(),
                            created: None,
                            owned_by: m
                                .get("providerName")
                                .and_then(|p| p.as_str())
                                .map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut response = ListModelsResponse {
            object: "list".to_string(),
            data,
            next_page_token: value
                .get("nextToken")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            extra_fields: Default::default(),
        };
        attach_raw(ctx, &mut response.extra_fields, &body);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::keys::{BedrockKeyConfig, KeyConfig};

    #[test]
    fn test_region_prefers_key_config() {
        let provider = BedrockProvider::new(BedrockConfig::default()).unwrap();
        let key = Key::new("").with_config(KeyConfig::Bedrock(BedrockKeyConfig {
            region: "eu-central-1".to_string(),
            access_key: None,
            secret_key: None,
            session_token: None,
        }));
        assert_eq!(provider.region(&key), "eu-central-1");
        assert_eq!(provider.region(&Key::new("tok")), "us-east-1");
    }

    #[test]
    fn test_bearer_auth_when_key_value_present() {
        let provider = BedrockProvider::new(BedrockConfig::default()).unwrap();
        let headers = provider
            .auth_headers(&Key::new("abc"), "POST", "https://x.amazonaws.com/y", b"{}", None)
            .unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn test_missing_credentials_is_auth_error() {
        let provider = BedrockProvider::new(BedrockConfig::default()).unwrap();
        let err = provider
            .auth_headers(&Key::new(""), "POST", "https://x.amazonaws.com/y", b"{}", None)
            .unwrap_err();
        assert_eq!(err.kind, crate::core::types::errors::ErrorKind::AuthError);
    }
}
