//! Deployment catalog cache behavior against a mock gateway.

use std::collections::HashMap;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unigate::core::caches::{DeploymentBackend, DeploymentCache};

fn catalog_body() -> serde_json::Value {
    serde_json::json!({
        "count": 3,
        "resources": [
            {
                "id": "d42",
                "status": "RUNNING",
                "details": {"resources": {"backend_details": {"model": {"name": "anthropic--claude-3-sonnet"}}}}
            },
            {
                "id": "d7",
                "status": "RUNNING",
                "details": {"resources": {"backend_details": {"model": {"name": "gpt-4o"}}}}
            },
            {
                "id": "d-dead",
                "status": "STOPPED",
                "details": {"resources": {"backend_details": {"model": {"name": "gemini-1.5-pro"}}}}
            }
        ]
    })
}

#[tokio::test]
async fn catalog_fetch_resolves_and_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/lm/deployments"))
        .and(query_param("status", "RUNNING"))
        .and(query_param("resourceGroup", "default"))
        .and(header("Authorization", "Bearer tok"))
        .and(header("AI-Resource-Group", "default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .mount(&server)
        .await;

    let base = format!("{}/v2", server.uri());
    let cache = DeploymentCache::new(reqwest::Client::new(), 3600);
    let static_map = HashMap::new();

    let (id, backend) = cache
        .get_deployment_id("anthropic--claude-3-sonnet", &static_map, &base, "default", "tok")
        .await
        .unwrap();
    assert_eq!(id, "d42");
    assert_eq!(backend, DeploymentBackend::Bedrock);

    // Second model resolves from the cached catalog without a second fetch.
    let (id, backend) = cache
        .get_deployment_id("gpt-4o", &static_map, &base, "default", "tok")
        .await
        .unwrap();
    assert_eq!(id, "d7");
    assert_eq!(backend, DeploymentBackend::OpenAi);

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stopped_deployments_are_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/lm/deployments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .mount(&server)
        .await;

    let base = format!("{}/v2", server.uri());
    let cache = DeploymentCache::new(reqwest::Client::new(), 3600);
    let err = cache
        .get_deployment_id("gemini-1.5-pro", &HashMap::new(), &base, "default", "tok")
        .await
        .unwrap_err();
    assert_eq!(err.kind, unigate::ErrorKind::OperationError);
    assert_eq!(
        err.error.message,
        "no running deployment found for model: gemini-1.5-pro"
    );
}

#[tokio::test]
async fn clear_cache_forces_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/lm/deployments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .mount(&server)
        .await;

    let base = format!("{}/v2", server.uri());
    let cache = DeploymentCache::new(reqwest::Client::new(), 3600);
    let static_map = HashMap::new();

    cache
        .get_deployment_id("gpt-4o", &static_map, &base, "default", "tok")
        .await
        .unwrap();
    cache.clear_cache(&base, "default").await;
    cache
        .get_deployment_id("gpt-4o", &static_map, &base, "default", "tok")
        .await
        .unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn static_map_short_circuits_catalog() {
    // No mock mounted: any request would 404 and fail the test.
    let server = MockServer::start().await;
    let base = format!("{}/v2", server.uri());
    let cache = DeploymentCache::new(reqwest::Client::new(), 3600);

    let mut static_map = HashMap::new();
    static_map.insert("amazon--nova-pro".to_string(), "d99".to_string());
    let (id, backend) = cache
        .get_deployment_id("amazon--nova-pro", &static_map, &base, "default", "tok")
        .await
        .unwrap();
    assert_eq!(id, "d99");
    assert_eq!(backend, DeploymentBackend::Bedrock);
    assert!(server.received_requests().await.unwrap().is_empty());
}
