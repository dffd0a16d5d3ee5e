//! OpenAI-format streaming end to end: anonymous-data SSE, chunk ordering,
//! and the dispatcher's post-hook wiring.

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unigate::core::context::RequestContext;
use unigate::core::hooks::{noop_post_hook, PostHookRunner};
use unigate::core::providers::openai::{OpenAiConfig, OpenAiProvider};
use unigate::core::traits::provider::LlmProvider;
use unigate::core::types::{
    ChatMessage, ChatRequest, FinishReason, GatewayRequest, Key, Provider, RequestType,
    StreamChunk,
};
use unigate::Dispatcher;

use tokio_stream::StreamExt;

fn sse_body() -> String {
    [
        r#"data: {"id":"chatcmpl-9","object":"chat.completion.chunk","created":1,"model":"gpt-4o-2024-08-06","choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
        r#"data: {"id":"chatcmpl-9","object":"chat.completion.chunk","created":1,"model":"gpt-4o-2024-08-06","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#,
        r#"data: {"id":"chatcmpl-9","object":"chat.completion.chunk","created":1,"model":"gpt-4o-2024-08-06","choices":[{"index":0,"delta":{"content":" world"}}]}"#,
        r#"data: {"id":"chatcmpl-9","object":"chat.completion.chunk","created":1,"model":"gpt-4o-2024-08-06","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        r#"data: {"id":"chatcmpl-9","object":"chat.completion.chunk","created":1,"model":"gpt-4o-2024-08-06","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n")
}

fn request() -> ChatRequest {
    ChatRequest::new(Provider::OpenAi, "gpt-4o").message(ChatMessage::user("hi"))
}

#[tokio::test]
async fn chunk_indices_are_gapless_and_metadata_is_stamped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(), "text/event-stream"))
        .mount(&server)
        .await;

    let provider =
        OpenAiProvider::new(OpenAiConfig::default().with_base_url(server.uri())).unwrap();
    let ctx = RequestContext::new();
    let mut stream = provider
        .chat_completion_stream(&ctx, noop_post_hook(), &Key::new("sk-test"), request())
        .await
        .unwrap();

    let mut indices = Vec::new();
    let mut text = String::new();
    let mut finish = None;
    while let Some(item) = stream.next().await {
        let chunk = item.unwrap();
        let extra = chunk.extra_fields();
        indices.push(extra.chunk_index.unwrap());
        assert_eq!(extra.provider, Some(Provider::OpenAi));
        assert_eq!(extra.model_requested.as_deref(), Some("gpt-4o"));
        assert_eq!(extra.request_type, Some(RequestType::ChatCompletionStream));

        if let StreamChunk::Chat(chat) = &chunk {
            for choice in &chat.choices {
                if let Some(content) = &choice.delta.content {
                    text.push_str(content);
                }
                if let Some(reason) = &choice.finish_reason {
                    finish = Some(reason.clone());
                }
            }
        }
    }

    assert_eq!(indices, (0..indices.len() as u64).collect::<Vec<_>>());
    assert_eq!(text, "Hello world");
    assert_eq!(finish, Some(FinishReason::Stop));
    assert!(ctx.stream_done());
}

#[tokio::test]
async fn post_hook_runs_for_every_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(), "text/event-stream"))
        .mount(&server)
        .await;

    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(
        OpenAiProvider::new(OpenAiConfig::default().with_base_url(server.uri())).unwrap(),
    ));

    // The hook rewrites every chunk's deployment tag; seeing it on all
    // received chunks proves it ran inside the pipeline.
    let hook: PostHookRunner = Arc::new(|_ctx, item| {
        item.map(|mut chunk| {
            chunk.extra_fields_mut().model_deployment = Some("hooked".to_string());
            chunk
        })
    });

    let ctx = RequestContext::new();
    let mut stream = dispatcher
        .execute_stream(&ctx, hook, &Key::new("sk-test"), GatewayRequest::Chat(request()))
        .await
        .unwrap();

    let mut count = 0usize;
    while let Some(item) = stream.next().await {
        let chunk = item.unwrap();
        assert_eq!(chunk.extra_fields().model_deployment.as_deref(), Some("hooked"));
        count += 1;
    }
    assert!(count >= 4);
}

#[tokio::test]
async fn preflight_http_error_returns_synchronously() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"type": "rate_limit_exceeded", "message": "slow down"}
        })))
        .mount(&server)
        .await;

    let provider =
        OpenAiProvider::new(OpenAiConfig::default().with_base_url(server.uri())).unwrap();
    let err = provider
        .chat_completion_stream(
            &RequestContext::new(),
            noop_post_hook(),
            &Key::new("sk-test"),
            request(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code, Some(429));
    assert_eq!(err.error.error_type.as_deref(), Some("rate_limit_exceeded"));
}
