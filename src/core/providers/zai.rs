//! ZAI provider. OpenAI-compatible, but the endpoint rejects
//! `stream_options`, so streaming payloads never carry it.

use async_trait::async_trait;

use crate::core::context::RequestContext;
use crate::core::hooks::PostHookRunner;
use crate::core::providers::openai_compat::{
    bearer_auth, CompatQuirks, OpenAiCompatEngine,
};
use crate::core::traits::provider::LlmProvider;
use crate::core::types::chat::ChatRequest;
use crate::core::types::common::{Provider, RequestType};
use crate::core::types::errors::Result;
use crate::core::types::response::ChatResponse;
use crate::core::types::{ChunkStream, Key};
use crate::utils::net::{build_http_client, HttpClientConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.z.ai/api/paas/v4";

#[derive(Debug, Clone)]
pub struct ZaiConfig {
    pub base_url: String,
    pub http: HttpClientConfig,
}

impl Default for ZaiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

pub struct ZaiProvider {
    engine: OpenAiCompatEngine,
}

impl ZaiProvider {
    pub fn new(config: ZaiConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self {
            engine: OpenAiCompatEngine::new(
                Provider::Zai,
                config.base_url,
                client,
                bearer_auth(),
                CompatQuirks {
                    omit_stream_options: true,
                    ..Default::default()
                },
            ),
        })
    }
}

#[async_trait]
impl LlmProvider for ZaiProvider {
    fn provider_key(&self) -> Provider {
        Provider::Zai
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
}
