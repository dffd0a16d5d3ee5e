//! Anthropic provider tests against a mock upstream.

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unigate::core::context::RequestContext;
use unigate::core::hooks::noop_post_hook;
use unigate::core::providers::anthropic::{AnthropicConfig, AnthropicProvider};
use unigate::core::traits::provider::LlmProvider;
use unigate::core::types::{ChatMessage, ChatRequest, FinishReason, Key, Provider, StreamChunk};

use tokio_stream::StreamExt;

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(Provider::Anthropic, model).message(ChatMessage::user("hello"))
}

#[tokio::test]
async fn cache_metrics_map_into_unified_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg_cache",
            "model": "claude-3-5-sonnet-20241022",
            "content": [{"type": "text", "text": "cached"}],
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 1000,
                "output_tokens": 500,
                "cache_creation_input_tokens": 200,
                "cache_read_input_tokens": 100,
                "cache_creation": {
                    "ephemeral_5m_input_tokens": 150,
                    "ephemeral_1h_input_tokens": 50
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::new(AnthropicConfig::default().with_base_url(server.uri())).unwrap();
    let response = provider
        .chat_completion(
            &RequestContext::new(),
            &Key::new("sk-ant-test"),
            request("claude-3-5-sonnet-20241022"),
        )
        .await
        .unwrap();

    assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));

    let usage = response.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 1000);
    assert_eq!(usage.completion_tokens, 500);
    assert_eq!(usage.total_tokens, 1500);

    let prompt = usage.prompt_tokens_details.unwrap();
    assert_eq!(prompt.cached_tokens, Some(100));
    assert_eq!(prompt.cache_read_tokens, Some(100));
    assert_eq!(prompt.cache_creation_tokens, Some(200));
    let ephemeral = prompt.cache_creation.unwrap();
    assert_eq!(ephemeral.ephemeral_5m_input_tokens, Some(150));
    assert_eq!(ephemeral.ephemeral_1h_input_tokens, Some(50));

    let completion = usage.completion_tokens_details.unwrap();
    assert_eq!(completion.cached_tokens, Some(200));
}

#[tokio::test]
async fn named_event_stream_end_to_end() {
    let sse_body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_s\",\"model\":\"claude-3-5-sonnet-20241022\",\"usage\":{\"input_tokens\":9,\"output_tokens\":0}}}\n",
        "\n",
        ": keep-alive\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\"}}\n",
        "\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n",
        "\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n",
        "\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
        "\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"input_tokens\":9,\"output_tokens\":2}}\n",
        "\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n",
        "\n",
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::new(AnthropicConfig::default().with_base_url(server.uri())).unwrap();
    let ctx = RequestContext::new();
    let mut stream = provider
        .chat_completion_stream(
            &ctx,
            noop_post_hook(),
            &Key::new("sk-ant-test"),
            request("claude-3-5-sonnet-20241022"),
        )
        .await
        .unwrap();

    let mut indices = Vec::new();
    let mut text = String::new();
    let mut finish = None;
    let mut final_usage = None;
    while let Some(item) = stream.next().await {
        let chunk = item.unwrap();
        indices.push(chunk.extra_fields().chunk_index.unwrap());
        if let StreamChunk::Chat(chat) = &chunk {
            for choice in &chat.choices {
                if let Some(content) = &choice.delta.content {
                    text.push_str(content);
                }
                if let Some(reason) = &choice.finish_reason {
                    finish = Some(reason.clone());
                }
            }
            if let Some(usage) = &chat.usage {
                final_usage = Some(usage.clone());
            }
        }
    }

    // Monotonic from zero, no gaps, channel closed after the last chunk.
    assert_eq!(indices, (0..indices.len() as u64).collect::<Vec<_>>());
    assert_eq!(text, "Hello");
    assert_eq!(finish, Some(FinishReason::Stop));
    assert_eq!(final_usage.unwrap().total_tokens, 11);
    assert!(ctx.stream_done());
}

#[tokio::test]
async fn provider_error_body_is_materialized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "max_tokens required"}
        })))
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::new(AnthropicConfig::default().with_base_url(server.uri())).unwrap();
    let err = provider
        .chat_completion(
            &RequestContext::new(),
            &Key::new("sk-ant-test"),
            request("claude-3-5-sonnet-20241022"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code, Some(400));
    assert_eq!(err.error.error_type.as_deref(), Some("invalid_request_error"));
    assert_eq!(err.error.message, "max_tokens required");
    assert!(!err.is_gateway_error);
}
