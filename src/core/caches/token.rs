//! OAuth2 client-credentials token cache.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::types::errors::GatewayError;
use crate::utils::net::{build_http_client, HttpClientConfig};

/// Margin applied before a token's stated expiry so a token never expires
/// mid-request. A token exactly at the margin counts as expired.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 30;

/// Timeout on the token endpoint call.
pub const TOKEN_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback lifetime when the server omits `expires_in` or reports a
/// non-positive value.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const TOKEN_URL_SUFFIX: &str = "/oauth/token";

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(TOKEN_EXPIRY_SKEW_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token cache keyed by `client_id:auth_url`. Read-lock-optimistic: the hot
/// path takes only the read lock; a refresh takes the write lock and
/// re-checks before fetching, so concurrent callers trigger one fetch.
pub struct TokenCache {
    client: reqwest::Client,
    tokens: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Result<Self, GatewayError> {
        let config = HttpClientConfig {
            timeout: TOKEN_FETCH_TIMEOUT,
            ..Default::default()
        };
        Ok(Self {
            client: build_http_client(&config)?,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    fn cache_key(client_id: &str, auth_url: &str) -> String {
        format!("{}:{}", client_id, auth_url)
    }

    /// The token endpoint: `<auth_url>/oauth/token`, appending the suffix
    /// only when the configured URL doesn't already carry it.
    fn token_url(auth_url: &str) -> String {
        let trimmed = auth_url.trim_end_matches('/');
        if trimmed.ends_with(TOKEN_URL_SUFFIX) {
            trimmed.to_string()
        } else {
            format!("{}{}", trimmed, TOKEN_URL_SUFFIX)
        }
    }

    /// Return a usable bearer token, fetching one only when the cached entry
    /// is missing or within the expiry skew.
    pub async fn get_token(
        &self,
        client_id: &str,
        client_secret: &str,
        auth_url: &str,
    ) -> Result<String, GatewayError> {
        let key = Self::cache_key(client_id, auth_url);
        let now = Utc::now();

        {
            let tokens = self.tokens.read().await;
            if let Some(token) = tokens.get(&key) {
                if token.is_usable(now) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut tokens = self.tokens.write().await;
        // Double-check: another task may have refreshed while we waited.
        let now = Utc::now();
        if let Some(token) = tokens.get(&key) {
            if token.is_usable(now) {
                return Ok(token.access_token.clone());
            }
        }

        debug!(auth_url, "fetching oauth2 token");
        let token = self.fetch_token(client_id, client_secret, auth_url).await?;
        let access_token = token.access_token.clone();
        tokens.insert(key, token);
        Ok(access_token)
    }

    async fn fetch_token(
        &self,
        client_id: &str,
        client_secret: &str,
        auth_url: &str,
    ) -> Result<CachedToken, GatewayError> {
        let url = Self::token_url(auth_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            ))
            .with_status(status.as_u16()));
        }

        let parsed: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::auth(format!("malformed token response: {}", e)))?;

        let expires_in = match parsed.expires_in {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_EXPIRES_IN_SECS,
        };

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        })
    }

    /// Drop a single cached token.
    pub async fn clear_token(&self, client_id: &str, auth_url: &str) {
        self.tokens
            .write()
            .await
            .remove(&Self::cache_key(client_id, auth_url));
    }

    /// Purge every strictly-expired entry.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.tokens
            .write()
            .await
            .retain(|_, token| now < token.expires_at);
    }

    /// Drop everything. Used on provider shutdown.
    pub async fn clear_all(&self) {
        self.tokens.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url_suffix_handling() {
        assert_eq!(
            TokenCache::token_url("https://auth.example.com"),
            "https://auth.example.com/oauth/token"
        );
        assert_eq!(
            TokenCache::token_url("https://auth.example.com/"),
            "https://auth.example.com/oauth/token"
        );
        assert_eq!(
            TokenCache::token_url("https://auth.example.com/oauth/token"),
            "https://auth.example.com/oauth/token"
        );
    }

    #[test]
    fn test_skew_boundary() {
        let now = Utc::now();
        // Exactly 30 s out: expired.
        let at_boundary = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(TOKEN_EXPIRY_SKEW_SECS),
        };
        assert!(!at_boundary.is_usable(now));

        // 31 s out: still valid.
        let past_boundary = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(TOKEN_EXPIRY_SKEW_SECS + 1),
        };
        assert!(past_boundary.is_usable(now));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_unexpired() {
        let cache = TokenCache::new().unwrap();
        {
            let mut tokens = cache.tokens.write().await;
            tokens.insert(
                "a:url".to_string(),
                CachedToken {
                    access_token: "live".to_string(),
                    expires_at: Utc::now() + ChronoDuration::seconds(600),
                },
            );
            tokens.insert(
                "b:url".to_string(),
                CachedToken {
                    access_token: "dead".to_string(),
                    expires_at: Utc::now() - ChronoDuration::seconds(1),
                },
            );
        }
        cache.cleanup().await;
        let tokens = cache.tokens.read().await;
        assert!(tokens.contains_key("a:url"));
        assert!(!tokens.contains_key("b:url"));
    }
}
