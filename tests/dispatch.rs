//! Dispatcher-level behavior: validation short-circuits, capability gating,
//! and metadata stamping.

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unigate::core::context::RequestContext;
use unigate::core::providers::openai::{OpenAiConfig, OpenAiProvider};
use unigate::core::types::image::ImageParams;
use unigate::core::types::{
    ChatMessage, ChatRequest, GatewayRequest, GatewayResponse, ImageGenerationRequest, Key,
    Provider, RequestType,
};
use unigate::{Dispatcher, ErrorKind};

fn dispatcher_with_openai(server: &MockServer) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(
        OpenAiProvider::new(OpenAiConfig::default().with_base_url(server.uri())).unwrap(),
    ));
    dispatcher
}

#[tokio::test]
async fn invalid_image_size_never_reaches_the_wire() {
    let server = MockServer::start().await;
    let dispatcher = dispatcher_with_openai(&server);

    let request = GatewayRequest::ImageGeneration(ImageGenerationRequest {
        provider: Provider::OpenAi,
        model: "dall-e-3".to_string(),
        input: "a lighthouse at dusk".to_string(),
        params: ImageParams {
            size: Some("1024".to_string()),
            ..Default::default()
        },
    });

    let err = dispatcher
        .execute(&RequestContext::new(), &Key::new("sk"), request)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OperationError);
    assert_eq!(err.error.message, "invalid size format");
    assert_eq!(err.provider, Some(Provider::OpenAi));
    assert_eq!(err.request_type, Some(RequestType::ImageGeneration));

    // No HTTP call was made.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_operation_carries_full_metadata() {
    let server = MockServer::start().await;
    let dispatcher = dispatcher_with_openai(&server);

    // OpenAI has no rerank capability; the default gate answers.
    let request = GatewayRequest::Rerank(unigate::core::types::RerankRequest {
        provider: Provider::OpenAi,
        model: "gpt-4o".to_string(),
        query: "q".to_string(),
        documents: vec![unigate::core::types::RerankDocument::text("d")],
        params: Default::default(),
    });

    let err = dispatcher
        .execute(&RequestContext::new(), &Key::new("sk"), request)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
    assert_eq!(err.provider, Some(Provider::OpenAi));
    assert_eq!(err.model_requested.as_deref(), Some("gpt-4o"));
    assert_eq!(err.request_type, Some(RequestType::Rerank));
    assert!(err.is_gateway_error);
}

#[tokio::test]
async fn unary_response_is_stamped_with_latency_and_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 2, "completion_tokens": 1, "total_tokens": 3}
        })))
        .mount(&server)
        .await;

    let dispatcher = dispatcher_with_openai(&server);
    let request = GatewayRequest::Chat(
        ChatRequest::new(Provider::OpenAi, "gpt-4o").message(ChatMessage::user("hi")),
    );
    let response = dispatcher
        .execute(&RequestContext::new(), &Key::new("sk"), request)
        .await
        .unwrap();

    let GatewayResponse::Chat(chat) = response else {
        panic!("expected chat response");
    };
    assert_eq!(chat.extra_fields.provider, Some(Provider::OpenAi));
    assert_eq!(chat.extra_fields.model_requested.as_deref(), Some("gpt-4o"));
    assert_eq!(chat.extra_fields.request_type, Some(RequestType::ChatCompletion));
    assert!(chat.extra_fields.latency_ms.is_some());
    // The effective model name is the provider's, not the requested alias.
    assert_eq!(chat.model, "gpt-4o-2024-08-06");
}

#[tokio::test]
async fn raw_response_capture_is_opt_in() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "id": "chatcmpl-raw",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-2024-08-06",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "x"},
            "finish_reason": "stop"
        }]
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let dispatcher = dispatcher_with_openai(&server);
    let request = || {
        GatewayRequest::Chat(
            ChatRequest::new(Provider::OpenAi, "gpt-4o").message(ChatMessage::user("hi")),
        )
    };

    let plain = dispatcher
        .execute(&RequestContext::new(), &Key::new("sk"), request())
        .await
        .unwrap();
    let GatewayResponse::Chat(plain) = plain else { panic!() };
    assert!(plain.extra_fields.raw_response.is_none());

    let ctx = RequestContext::new().with_raw_response(true);
    let captured = dispatcher
        .execute(&ctx, &Key::new("sk"), request())
        .await
        .unwrap();
    let GatewayResponse::Chat(captured) = captured else { panic!() };
    assert_eq!(captured.extra_fields.raw_response, Some(body));
}
