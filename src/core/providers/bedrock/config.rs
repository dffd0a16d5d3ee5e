//! Bedrock provider configuration.

use crate::utils::net::HttpClientConfig;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct BedrockConfig {
    /// Fallback region when the key config doesn't carry one.
    pub region: String,
    /// Override for the runtime endpoint; defaults to the regional
    /// `bedrock-runtime` host.
    pub base_url: Option<String>,
    pub http: HttpClientConfig,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            base_url: None,
            http: HttpClientConfig::default(),
        }
    }
}

impl BedrockConfig {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn runtime_url(&self, region: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", region))
    }

    pub fn control_url(&self, region: &str) -> String {
        format!("https://bedrock.{}.amazonaws.com", region)
    }
}
