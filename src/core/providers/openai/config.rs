//! OpenAI provider configuration.

use crate::utils::net::HttpClientConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub http: HttpClientConfig,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

impl OpenAiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.http = self.http.with_timeout_secs(secs);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.http = self.http.with_proxy(proxy);
        self
    }
}
