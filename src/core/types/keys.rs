//! Caller credential bundles.
//!
//! Which key to use for a request is the orchestrator's decision; the
//! gateway only validates the shape it is handed and turns it into the
//! provider's auth headers. Key values arrive as plain strings resolved by
//! the caller; the gateway never reads the environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::errors::GatewayError;

/// A per-provider credential bundle: the opaque token value plus any
/// provider-typed sub-configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// API key / token value. May be empty for providers whose sub-config
    /// carries the real credentials (Bedrock IAM, SAP client credentials).
    #[serde(default)]
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<KeyConfig>,
}

impl Key {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: KeyConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn bedrock_config(&self) -> Result<&BedrockKeyConfig, GatewayError> {
        match &self.config {
            Some(KeyConfig::Bedrock(config)) => Ok(config),
            _ => Err(GatewayError::auth("bedrock key config is required")),
        }
    }

    pub fn azure_config(&self) -> Result<&AzureKeyConfig, GatewayError> {
        match &self.config {
            Some(KeyConfig::Azure(config)) => Ok(config),
            _ => Err(GatewayError::auth("azure key config is required")),
        }
    }

    pub fn vertex_config(&self) -> Result<&VertexKeyConfig, GatewayError> {
        match &self.config {
            Some(KeyConfig::Vertex(config)) => Ok(config),
            _ => Err(GatewayError::auth("vertex key config is required")),
        }
    }

    pub fn sap_ai_core_config(&self) -> Result<&SapAiCoreKeyConfig, GatewayError> {
        match &self.config {
            Some(KeyConfig::SapAiCore(config)) => Ok(config),
            _ => Err(GatewayError::auth("sap ai core key config is required")),
        }
    }
}

/// Provider-typed key sub-configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum KeyConfig {
    Bedrock(BedrockKeyConfig),
    Azure(AzureKeyConfig),
    Vertex(VertexKeyConfig),
    SapAiCore(SapAiCoreKeyConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockKeyConfig {
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureKeyConfig {
    /// Resource endpoint, e.g. `https://myresource.openai.azure.com`.
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// model → deployment name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub deployments: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexKeyConfig {
    pub project_id: String,
    pub region: String,
    /// Pre-fetched OAuth bearer token. Token acquisition (service-account
    /// exchange, metadata server) is the caller's concern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SapAiCoreKeyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub base_url: String,
    pub resource_group: String,
    /// Static model → deployment-ID map. Entries here short-circuit the
    /// dynamic deployment catalog.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub deployments: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_config_accessor() {
        let key = Key::new("").with_config(KeyConfig::Bedrock(BedrockKeyConfig {
            region: "us-east-1".to_string(),
            access_key: Some("AKIA...".to_string()),
            secret_key: Some("secret".to_string()),
            session_token: None,
        }));
        assert_eq!(key.bedrock_config().unwrap().region, "us-east-1");
        assert!(key.azure_config().is_err());
    }

    #[test]
    fn test_key_config_tagging() {
        let json = r#"{"provider":"sap_ai_core","client_id":"c","client_secret":"s","auth_url":"https://auth","base_url":"https://api","resource_group":"default"}"#;
        let config: KeyConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config, KeyConfig::SapAiCore(_)));
    }
}
