//! SAP AI Core deployment catalog cache.
//!
//! Maps model names to running deployment IDs, keyed by
//! `(base_url, resource_group)`. Static mappings from the key configuration
//! always win; the dynamic catalog is fetched lazily and held for the TTL.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::transport;
use crate::core::types::errors::GatewayError;
use crate::core::types::Provider;
use crate::utils::net::join_url;

/// Default catalog lifetime.
pub const DEFAULT_DEPLOYMENT_TTL_SECS: i64 = 3600;

/// Shortest allowed lifetime; anything positive below this is clamped up.
pub const MIN_DEPLOYMENT_TTL_SECS: i64 = 60;

/// Which translator family a deployment routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentBackend {
    OpenAi,
    Bedrock,
    Vertex,
}

impl DeploymentBackend {
    /// Classification is a prefix test on the model name; exactly one
    /// backend per model.
    pub fn classify(model: &str) -> Self {
        if model.starts_with("anthropic--") || model.starts_with("amazon--") {
            DeploymentBackend::Bedrock
        } else if model.starts_with("gemini-") {
            DeploymentBackend::Vertex
        } else {
            DeploymentBackend::OpenAi
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentBackend::OpenAi => "openai",
            DeploymentBackend::Bedrock => "bedrock",
            DeploymentBackend::Vertex => "vertex",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentEntry {
    pub deployment_id: String,
    pub model_name: String,
    pub backend: DeploymentBackend,
}

#[derive(Debug)]
struct CachedCatalog {
    fetched_at: DateTime<Utc>,
    models: HashMap<String, DeploymentEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    resources: Vec<CatalogDeployment>,
}

#[derive(Debug, Deserialize)]
struct CatalogDeployment {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Option<CatalogDetails>,
}

#[derive(Debug, Deserialize)]
struct CatalogDetails {
    #[serde(default)]
    resources: Option<CatalogResources>,
}

#[derive(Debug, Deserialize)]
struct CatalogResources {
    #[serde(default)]
    backend_details: Option<CatalogBackendDetails>,
}

#[derive(Debug, Deserialize)]
struct CatalogBackendDetails {
    #[serde(default)]
    model: Option<CatalogModel>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    #[serde(default)]
    name: Option<String>,
}

impl CatalogDeployment {
    fn model_name(&self) -> Option<&str> {
        self.details
            .as_ref()?
            .resources
            .as_ref()?
            .backend_details
            .as_ref()?
            .model
            .as_ref()?
            .name
            .as_deref()
    }
}

pub struct DeploymentCache {
    client: reqwest::Client,
    ttl: ChronoDuration,
    catalogs: RwLock<HashMap<(String, String), CachedCatalog>>,
}

impl DeploymentCache {
    /// `ttl_secs` ≤ 0 falls back to the default; positive values below the
    /// minimum are clamped up to it.
    pub fn new(client: reqwest::Client, ttl_secs: i64) -> Self {
        Self {
            client,
            ttl: ChronoDuration::seconds(Self::clamp_ttl_secs(ttl_secs)),
            catalogs: RwLock::new(HashMap::new()),
        }
    }

    pub fn clamp_ttl_secs(ttl_secs: i64) -> i64 {
        if ttl_secs <= 0 {
            DEFAULT_DEPLOYMENT_TTL_SECS
        } else {
            ttl_secs.max(MIN_DEPLOYMENT_TTL_SECS)
        }
    }

    fn fresh(&self, catalog: &CachedCatalog, now: DateTime<Utc>) -> bool {
        now - catalog.fetched_at < self.ttl
    }

    /// Resolve a model to `(deployment_id, backend)`. The static map wins;
    /// otherwise the cached catalog is consulted, refreshed when stale, and
    /// a model absent from a fresh catalog is a client-visible error.
    pub async fn get_deployment_id(
        &self,
        model: &str,
        static_map: &HashMap<String, String>,
        base_url: &str,
        resource_group: &str,
        bearer_token: &str,
    ) -> Result<(String, DeploymentBackend), GatewayError> {
        if let Some(deployment_id) = static_map.get(model) {
            return Ok((deployment_id.clone(), DeploymentBackend::classify(model)));
        }

        let key = (base_url.to_string(), resource_group.to_string());
        let now = Utc::now();

        {
            let catalogs = self.catalogs.read().await;
            if let Some(catalog) = catalogs.get(&key) {
                if self.fresh(catalog, now) {
                    if let Some(entry) = catalog.models.get(model) {
                        return Ok((entry.deployment_id.clone(), entry.backend));
                    }
                }
            }
        }

        let mut catalogs = self.catalogs.write().await;
        let now = Utc::now();
        if let Some(catalog) = catalogs.get(&key) {
            if self.fresh(catalog, now) {
                if let Some(entry) = catalog.models.get(model) {
                    return Ok((entry.deployment_id.clone(), entry.backend));
                }
            }
        }

        debug!(base_url, resource_group, "refreshing deployment catalog");
        let models = self
            .fetch_catalog(base_url, resource_group, bearer_token)
            .await?;
        let catalog = CachedCatalog {
            fetched_at: Utc::now(),
            models,
        };
        let result = catalog
            .models
            .get(model)
            .map(|entry| (entry.deployment_id.clone(), entry.backend));
        catalogs.insert(key, catalog);

        result.ok_or_else(|| {
            GatewayError::operation(format!("no running deployment found for model: {}", model))
        })
    }

    async fn fetch_catalog(
        &self,
        base_url: &str,
        resource_group: &str,
        bearer_token: &str,
    ) -> Result<HashMap<String, DeploymentEntry>, GatewayError> {
        let url = format!(
            "{}?status=RUNNING&resourceGroup={}",
            join_url(base_url, "lm/deployments"),
            resource_group
        );
        let headers = transport::build_headers(&[
            ("Authorization", format!("Bearer {}", bearer_token)),
            ("AI-Resource-Group", resource_group.to_string()),
        ])?;

        let body = transport::get_json(&self.client, &Provider::SapAiCore, &url, headers).await?;
        let parsed: CatalogResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::decode(format!("malformed deployment catalog: {}", e)))?;

        let mut models = HashMap::new();
        for deployment in parsed.resources {
            if deployment.status.as_deref() != Some("RUNNING") {
                continue;
            }
            let Some(name) = deployment.model_name() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            models.insert(
                name.to_string(),
                DeploymentEntry {
                    deployment_id: deployment.id.clone(),
                    model_name: name.to_string(),
                    backend: DeploymentBackend::classify(name),
                },
            );
        }
        Ok(models)
    }

    /// Drop one catalog; empty base URL and resource group drop them all.
    pub async fn clear_cache(&self, base_url: &str, resource_group: &str) {
        let mut catalogs = self.catalogs.write().await;
        if base_url.is_empty() && resource_group.is_empty() {
            catalogs.clear();
        } else {
            catalogs.remove(&(base_url.to_string(), resource_group.to_string()));
        }
    }
}
