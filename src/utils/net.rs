//! HTTP client construction shared by all providers.
//!
//! Each provider instance owns exactly one pooled client built here; the
//! pool is released on provider shutdown.

use reqwest::{Client, ClientBuilder, Proxy};
use std::collections::HashMap;
use std::time::Duration;

use crate::core::types::errors::GatewayError;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Overall request timeout.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 2048,
            pool_idle_timeout: Duration::from_secs(45),
            proxy: None,
            user_agent: "unigate/0.1".to_string(),
            default_headers: HashMap::new(),
        }
    }
}

impl HttpClientConfig {
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// Build the pooled client. Gzip decompression is handled here; decompressed
/// responses arrive with `Content-Encoding` already cleared so nothing
/// downstream re-applies it.
pub fn build_http_client(config: &HttpClientConfig) -> Result<Client, GatewayError> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .gzip(true)
        .user_agent(&config.user_agent);

    if let Some(proxy_url) = &config.proxy {
        let proxy = Proxy::all(proxy_url)
            .map_err(|e| GatewayError::operation(format!("invalid proxy configuration: {}", e)))?;
        builder = builder.proxy(proxy);
    }

    if !config.default_headers.is_empty() {
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.default_headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| GatewayError::operation(format!("invalid header name '{}': {}", key, e)))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| GatewayError::operation(format!("invalid header value for '{}': {}", key, e)))?;
            headers.insert(name, value);
        }
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| GatewayError::operation(format!("failed to build HTTP client: {}", e)))
}

/// Join a path onto a base URL without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

pub fn validate_url(url: &str) -> Result<(), GatewayError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| GatewayError::operation(format!("invalid URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(GatewayError::operation(format!(
            "unsupported URL scheme '{}'",
            scheme
        ))),
    }
}
