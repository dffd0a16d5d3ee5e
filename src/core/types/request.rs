//! The tagged request/response families and the stream chunk envelope.

use futures::Stream;
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::wrappers::ReceiverStream;

use super::chat::ChatRequest;
use super::common::{CountTokensResponse, Provider, RequestType};
use super::completion::{TextCompletionRequest, TextCompletionResponse};
use super::embedding::{EmbeddingRequest, EmbeddingResponse};
use super::errors::GatewayError;
use super::image::{ImageGenerationRequest, ImageGenerationResponse};
use super::model_list::{ListModelsRequest, ListModelsResponse};
use super::rerank::{RerankRequest, RerankResponse};
use super::response::{ChatChunk, ChatResponse};
use super::responses_api::{ResponsesEvent, ResponsesRequest, ResponsesResponse};

/// One unified request: exactly one operation-typed variant. Dispatch
/// pattern-matches on the variant; no inheritance anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayRequest {
    Chat(ChatRequest),
    Responses(ResponsesRequest),
    TextCompletion(TextCompletionRequest),
    Embedding(EmbeddingRequest),
    ImageGeneration(ImageGenerationRequest),
    Rerank(RerankRequest),
    ListModels(ListModelsRequest),
}

impl GatewayRequest {
    pub fn provider(&self) -> &Provider {
        match self {
            GatewayRequest::Chat(r) => &r.provider,
            GatewayRequest::Responses(r) => &r.provider,
            GatewayRequest::TextCompletion(r) => &r.provider,
            GatewayRequest::Embedding(r) => &r.provider,
            GatewayRequest::ImageGeneration(r) => &r.provider,
            GatewayRequest::Rerank(r) => &r.provider,
            GatewayRequest::ListModels(r) => &r.provider,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            GatewayRequest::Chat(r) => &r.model,
            GatewayRequest::Responses(r) => &r.model,
            GatewayRequest::TextCompletion(r) => &r.model,
            GatewayRequest::Embedding(r) => &r.model,
            GatewayRequest::ImageGeneration(r) => &r.model,
            GatewayRequest::Rerank(r) => &r.model,
            GatewayRequest::ListModels(_) => "",
        }
    }

    /// The request type of the unary form of this request. Streaming is a
    /// property of how the request is dispatched, not of its payload.
    pub fn request_type(&self) -> RequestType {
        match self {
            GatewayRequest::Chat(_) => RequestType::ChatCompletion,
            GatewayRequest::Responses(_) => RequestType::Responses,
            GatewayRequest::TextCompletion(_) => RequestType::TextCompletion,
            GatewayRequest::Embedding(_) => RequestType::Embedding,
            GatewayRequest::ImageGeneration(_) => RequestType::ImageGeneration,
            GatewayRequest::Rerank(_) => RequestType::Rerank,
            GatewayRequest::ListModels(_) => RequestType::ListModels,
        }
    }

    /// Validate the envelope invariant: the populated input shape must be
    /// non-empty for operations that require one.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let ok = match self {
            GatewayRequest::Chat(r) => !r.input.is_empty(),
            GatewayRequest::Responses(r) => !r.input.is_empty(),
            GatewayRequest::TextCompletion(r) => !r.input.is_empty(),
            GatewayRequest::Embedding(r) => !r.input.is_empty(),
            GatewayRequest::ImageGeneration(r) => !r.input.is_empty(),
            GatewayRequest::Rerank(r) => !r.query.is_empty() && !r.documents.is_empty(),
            GatewayRequest::ListModels(_) => true,
        };
        if ok {
            Ok(())
        } else {
            Err(GatewayError::operation("request input must not be empty")
                .with_provider(self.provider().clone())
                .with_model(self.model())
                .with_request_type(self.request_type()))
        }
    }
}

/// Unified response family, mirrored per operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayResponse {
    Chat(ChatResponse),
    Responses(ResponsesResponse),
    TextCompletion(TextCompletionResponse),
    Embedding(EmbeddingResponse),
    ImageGeneration(ImageGenerationResponse),
    Rerank(RerankResponse),
    ListModels(ListModelsResponse),
    CountTokens(CountTokensResponse),
}

impl GatewayResponse {
    pub fn extra_fields_mut(&mut self) -> &mut super::common::ResponseExtraFields {
        match self {
            GatewayResponse::Chat(r) => &mut r.extra_fields,
            GatewayResponse::Responses(r) => &mut r.extra_fields,
            GatewayResponse::TextCompletion(r) => &mut r.extra_fields,
            GatewayResponse::Embedding(r) => &mut r.extra_fields,
            GatewayResponse::ImageGeneration(r) => &mut r.extra_fields,
            GatewayResponse::Rerank(r) => &mut r.extra_fields,
            GatewayResponse::ListModels(r) => &mut r.extra_fields,
            GatewayResponse::CountTokens(r) => &mut r.extra_fields,
        }
    }
}

/// One element of a unified stream: a chat-shaped delta chunk or a
/// Responses-API lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamChunk {
    Chat(ChatChunk),
    Responses(ResponsesEvent),
}

impl StreamChunk {
    pub fn extra_fields_mut(&mut self) -> &mut super::common::ResponseExtraFields {
        match self {
            StreamChunk::Chat(chunk) => &mut chunk.extra_fields,
            StreamChunk::Responses(event) => &mut event.extra_fields,
        }
    }

    pub fn extra_fields(&self) -> &super::common::ResponseExtraFields {
        match self {
            StreamChunk::Chat(chunk) => &chunk.extra_fields,
            StreamChunk::Responses(event) => &event.extra_fields,
        }
    }
}

pin_project! {
    /// The caller-facing stream handle: a bounded channel drained as a
    /// stream. The channel closes when the reader task finishes (normally
    /// or on a terminal error chunk).
    #[derive(Debug)]
    pub struct ChunkStream {
        #[pin]
        inner: ReceiverStream<Result<StreamChunk, GatewayError>>,
    }
}

impl ChunkStream {
    pub(crate) fn new(
        receiver: tokio::sync::mpsc::Receiver<Result<StreamChunk, GatewayError>>,
    ) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
        }
    }
}

impl Stream for ChunkStream {
    type Item = Result<StreamChunk, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
