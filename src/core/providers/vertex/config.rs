//! Vertex provider configuration.

use crate::utils::net::HttpClientConfig;

#[derive(Debug, Clone, Default)]
pub struct VertexConfig {
    /// Override for the regional endpoint; defaults to
    /// `https://<region>-aiplatform.googleapis.com`.
    pub base_url: Option<String>,
    pub http: HttpClientConfig,
}

impl VertexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn endpoint(&self, region: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", region))
    }
}
