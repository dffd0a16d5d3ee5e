//! Wire-level plumbing: request execution with error-body materialization,
//! large-response handling, and the two streaming frame readers.

pub mod eventstream;
pub mod sse;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};

use crate::core::context::RequestContext;
use crate::core::types::common::MAX_ERROR_BODY_BYTES;
use crate::core::types::errors::GatewayError;
use crate::core::types::Provider;

/// Bytes pre-fetched from an oversized response so metadata can be inspected
/// before the caller decides to drain the rest.
pub const LARGE_RESPONSE_PREFETCH_BYTES: usize = 64 * 1024;

/// Build a `HeaderMap` from string pairs, rejecting malformed names/values
/// before anything reaches the wire.
pub fn build_headers(pairs: &[(&str, String)]) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GatewayError::operation(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GatewayError::operation(format!("invalid header value: {}", e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// POST a JSON payload and return the 2xx body. Non-2xx responses are
/// materialized into `provider_api_error` with the native error detail.
pub async fn post_json(
    client: &Client,
    provider: &Provider,
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<Bytes, GatewayError> {
    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| classify_send_error(provider, e))?;
    read_success_body(provider, response).await
}

/// GET and return the 2xx body.
pub async fn get_json(
    client: &Client,
    provider: &Provider,
    url: &str,
    headers: HeaderMap,
) -> Result<Bytes, GatewayError> {
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| classify_send_error(provider, e))?;
    read_success_body(provider, response).await
}

/// POST a JSON payload expecting a streaming body. On success the response
/// is handed back untouched for the protocol reader; pre-flight failures
/// (connect errors, non-2xx with a buffered body) come back synchronously.
pub async fn post_stream(
    client: &Client,
    provider: &Provider,
    url: &str,
    headers: HeaderMap,
    body: &serde_json::Value,
) -> Result<Response, GatewayError> {
    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| classify_send_error(provider, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(materialize_error(provider, status, &body))
}

/// POST raw bytes (pre-serialized payloads, signed requests).
pub async fn post_bytes(
    client: &Client,
    provider: &Provider,
    url: &str,
    headers: HeaderMap,
    body: Vec<u8>,
) -> Result<Bytes, GatewayError> {
    let response = client
        .post(url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| classify_send_error(provider, e))?;
    read_success_body(provider, response).await
}

/// Streaming variant of [`post_bytes`].
pub async fn post_bytes_stream(
    client: &Client,
    provider: &Provider,
    url: &str,
    headers: HeaderMap,
    body: Vec<u8>,
) -> Result<Response, GatewayError> {
    let response = client
        .post(url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| classify_send_error(provider, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(materialize_error(provider, status, &body))
}

async fn read_success_body(provider: &Provider, response: Response) -> Result<Bytes, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response.bytes().await.map_err(|e| {
            GatewayError::decode(format!("failed reading response body: {}", e))
                .with_provider(provider.clone())
        });
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(materialize_error(provider, status, &body))
}

fn classify_send_error(provider: &Provider, err: reqwest::Error) -> GatewayError {
    let gateway_err: GatewayError = err.into();
    gateway_err.with_provider(provider.clone())
}

/// Turn a non-2xx upstream body into the error envelope. Recognizes the two
/// common native shapes, `{"error": {...}}` and a flat `{"message": ...}`,
/// and keeps the raw body (capped) for callers that want it.
pub fn materialize_error(provider: &Provider, status: StatusCode, body: &[u8]) -> GatewayError {
    let capped = &body[..body.len().min(MAX_ERROR_BODY_BYTES)];
    let parsed: Option<serde_json::Value> = serde_json::from_slice(capped).ok();

    let mut message = String::new();
    let mut error_type = None;
    let mut code = None;
    let mut param = None;

    if let Some(value) = &parsed {
        let detail = value.get("error").unwrap_or(value);
        if let Some(m) = detail.get("message").and_then(|v| v.as_str()) {
            message = m.to_string();
        }
        error_type = detail
            .get("type")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            // AWS-shaped errors carry the native type in `__type`.
            .or_else(|| {
                detail
                    .get("__type")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
        code = match detail.get("code") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        param = detail
            .get("param")
            .and_then(|v| v.as_str())
            .map(str::to_string);
    }

    if message.is_empty() {
        message = String::from_utf8_lossy(capped).into_owned();
    }
    if message.is_empty() {
        message = format!("provider returned status {}", status.as_u16());
    }

    let mut err = GatewayError::provider_api(provider.clone(), status.as_u16(), message);
    if let Some(t) = error_type {
        err = err.with_error_type(t);
    }
    if let Some(c) = code {
        err = err.with_code(c);
    }
    if let Some(p) = param {
        err = err.with_param(p);
    }
    if let Some(inner) = parsed {
        err = err.with_inner(inner);
    }
    err
}

/// A response too large to buffer eagerly: a prefetched head for metadata
/// plus the still-open body for streaming the remainder.
pub struct LargeResponseBody {
    pub head: Bytes,
    pub response: Option<Response>,
}

/// Apply large-response handling when the context carries a threshold and
/// the response advertises a larger content length. Returns the full body
/// in the common (small) case.
pub async fn read_body_with_large_support(
    ctx: &RequestContext,
    provider: &Provider,
    response: Response,
) -> Result<Bytes, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        return Err(materialize_error(provider, status, &body));
    }

    if let Some(threshold) = ctx.large_response_threshold() {
        let content_length = response.content_length().unwrap_or(0) as usize;
        if content_length > threshold {
            let mut response = response;
            let mut head = Vec::with_capacity(LARGE_RESPONSE_PREFETCH_BYTES);
            while head.len() < LARGE_RESPONSE_PREFETCH_BYTES {
                match response.chunk().await {
                    Ok(Some(chunk)) => head.extend_from_slice(&chunk),
                    Ok(None) => break,
                    Err(e) => {
                        return Err(GatewayError::decode(format!(
                            "failed prefetching large response: {}",
                            e
                        ))
                        .with_provider(provider.clone()))
                    }
                }
            }
            let head = Bytes::from(head);
            ctx.stash_large_response(LargeResponseBody {
                head: head.clone(),
                response: Some(response),
            });
            return Ok(head);
        }
    }

    response.bytes().await.map_err(|e| {
        GatewayError::decode(format!("failed reading response body: {}", e))
            .with_provider(provider.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_openai_shape() {
        let body = br#"{"error":{"type":"invalid_request_error","message":"bad model","param":"model","code":"model_not_found"}}"#;
        let err = materialize_error(&Provider::OpenAi, StatusCode::NOT_FOUND, body);
        assert_eq!(err.status_code, Some(404));
        assert_eq!(err.error.error_type.as_deref(), Some("invalid_request_error"));
        assert_eq!(err.error.message, "bad model");
        assert_eq!(err.error.param.as_deref(), Some("model"));
        assert_eq!(err.error.code.as_deref(), Some("model_not_found"));
        assert!(!err.is_gateway_error);
    }

    #[test]
    fn test_materialize_aws_shape() {
        let body = br#"{"__type":"ValidationException","message":"too many tokens"}"#;
        let err = materialize_error(&Provider::Bedrock, StatusCode::BAD_REQUEST, body);
        assert_eq!(err.error.error_type.as_deref(), Some("ValidationException"));
        assert_eq!(err.error.message, "too many tokens");
    }

    #[test]
    fn test_materialize_non_json_body() {
        let err = materialize_error(&Provider::Anthropic, StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(err.error.message, "upstream down");
        assert_eq!(err.status_code, Some(502));
    }

    #[test]
    fn test_materialize_empty_body() {
        let err = materialize_error(&Provider::Anthropic, StatusCode::INTERNAL_SERVER_ERROR, b"");
        assert_eq!(err.error.message, "provider returned status 500");
    }

    #[test]
    fn test_build_headers_rejects_bad_name() {
        assert!(build_headers(&[("bad header", "v".to_string())]).is_err());
        assert!(build_headers(&[("x-api-key", "v".to_string())]).is_ok());
    }
}
