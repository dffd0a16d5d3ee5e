//! Vertex provider implementation.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::config::VertexConfig;
use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::gemini::streaming::convert_generate_frame;
use crate::core::providers::gemini::translation;
use crate::core::streaming::{self, StreamEmitter, StreamState};
use crate::core::traits::provider::LlmProvider;
use crate::core::transport::{self, sse::SseMode};
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::errors::{GatewayError, Result};
use crate::core::types::keys::VertexKeyConfig;
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::build_http_client;

pub struct VertexProvider {
    config: VertexConfig,
    client: reqwest::Client,
}

impl VertexProvider {
    pub fn new(config: VertexConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self { config, client })
    }

    fn model_url(&self, config: &VertexKeyConfig, model: &str, action: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
            self.config.endpoint(&config.region),
            config.project_id,
            config.region,
            model,
            action
        )
    }

    /// Vertex authenticates with a caller-supplied bearer token: either a
    /// pre-fetched one on the key config or the key value itself.
    fn headers(&self, key: &Key) -> Result<HeaderMap> {
        let token = match &key.config {
            Some(crate::core::types::KeyConfig::Vertex(config)) => config
                .auth_token
                .clone()
                .unwrap_or_else(|| key.value.clone()),
            _ => key.value.clone(),
        };
        if token.is_empty() {
            return Err(GatewayError::auth("vertex requires a bearer token"));
        }
        transport::build_headers(&[
            ("Authorization", format!("Bearer {}", token)),
            ("Content-Type", "application/json".to_string()),
        ])
    }
}

#[async_trait]
impl LlmProvider for VertexProvider {
    fn provider_key(&self) -> Provider {
        Provider::Vertex
    }

    fn capabilities(&self) -> &'static [RequestType] {
        &[
            RequestType::ChatCompletion,
            RequestType::ChatCompletionStream,
        ]
    }

    async fn chat_completion(
        &self,
        ctx: &RequestContext,
        key: &Key,
        request: ChatRequest,
    ) -> Result<ChatResponse> {
        let vertex_config = key.vertex_config()?;
        let payload =
            translation::build_generate_content_payload(&request.input, &request.params)?;
        let url = self.model_url(vertex_config, &request.model, "generateContent");
        let body = transport::post_json(
            &self.client,
            &Provider::Vertex,
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
        let vertex_config = key.vertex_config()?;
        let payload =
            translation::build_generate_content_payload(&request.input, &request.params)?;
        let url = format!(
            "{}?alt=sse",
            self.model_url(vertex_config, &request.model, "streamGenerateContent")
        );
        let response = transport::post_stream(
            &self.client,
            &Provider::Vertex,
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
            Provider::Vertex,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::keys::KeyConfig;

    fn vertex_key() -> Key {
        Key::new("").with_config(KeyConfig::Vertex(VertexKeyConfig {
            project_id: "my-project".to_string(),
            region: "us-central1".to_string(),
            auth_token: Some("ya29.token".to_string()),
        }))
    }

    #[test]
    fn test_model_url_shape() {
        let provider = VertexProvider::new(VertexConfig::default()).unwrap();
        let key = vertex_key();
        let url = provider.model_url(
            key.vertex_config().unwrap(),
            "gemini-2.0-flash",
            "generateContent",
        );
        assert_eq!(
            url,
            "https://us-central1-aiplatform.googleapis.com/v1/projects/my-project/locations/us-central1/publishers/google/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_missing_token_is_auth_error() {
        let provider = VertexProvider::new(VertexConfig::default()).unwrap();
        let err = provider.headers(&Key::new("")).unwrap_err();
        assert_eq!(err.kind, crate::core::types::errors::ErrorKind::AuthError);
    }
}
