//! Anthropic provider configuration.

use crate::utils::net::HttpClientConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Pinned wire version; sent on every request.
pub const API_VERSION: &str = "2023-06-01";

/// When the caller doesn't cap completion tokens, the messages API still
/// requires one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_version: String,
    pub http: HttpClientConfig,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: API_VERSION.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

impl AnthropicConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.http = self.http.with_timeout_secs(secs);
        self
    }
}
