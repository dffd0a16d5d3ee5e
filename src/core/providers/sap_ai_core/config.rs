//! SAP AI Core provider configuration.

use crate::utils::net::HttpClientConfig;

/// API version on OpenAI-backed deployment endpoints.
pub const OPENAI_API_VERSION: &str = "2024-12-01-preview";

#[derive(Debug, Clone)]
pub struct SapAiCoreConfig {
    /// Deployment-catalog lifetime in seconds; ≤ 0 uses the default hour,
    /// sub-minute values are clamped up.
    pub deployment_cache_ttl_secs: i64,
    pub http: HttpClientConfig,
}

impl Default for SapAiCoreConfig {
    fn default() -> Self {
        Self {
            deployment_cache_ttl_secs: 0,
            http: HttpClientConfig::default(),
        }
    }
}

impl SapAiCoreConfig {
    pub fn with_deployment_cache_ttl_secs(mut self, secs: i64) -> Self {
        self.deployment_cache_ttl_secs = secs;
        self
    }
}

/// Base URLs are pinned to the `/v2` API root however the caller wrote them.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/v2") {
        trimmed.to_string()
    } else {
        format!("{}/v2", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(
            normalize_base_url("https://api.ai.prod.example.com"),
            "https://api.ai.prod.example.com/v2"
        );
        assert_eq!(
            normalize_base_url("https://api.ai.prod.example.com/"),
            "https://api.ai.prod.example.com/v2"
        );
        assert_eq!(
            normalize_base_url("https://api.ai.prod.example.com/v2"),
            "https://api.ai.prod.example.com/v2"
        );
        assert_eq!(
            normalize_base_url("https://api.ai.prod.example.com/v2/"),
            "https://api.ai.prod.example.com/v2"
        );
    }
}
