//! Provider-neutral schema: the request/response/error types the gateway
//! exposes to callers, plus key configuration and the chunk envelope.

pub mod chat;
pub mod common;
pub mod completion;
pub mod embedding;
pub mod errors;
pub mod image;
pub mod keys;
pub mod message;
pub mod model_list;
pub mod request;
pub mod rerank;
pub mod responses_api;
pub mod response;
pub mod tools;
pub mod usage;

pub use chat::{ChatMessage, ChatParams, ChatRequest};
pub use common::{
    CountTokensResponse, FinishReason, Provider, RequestType, ResponseExtraFields,
    DEFAULT_PAGE_SIZE, DEFAULT_STREAM_BUFFER_SIZE, MAX_ERROR_BODY_BYTES,
};
pub use completion::{TextCompletionChoice, TextCompletionRequest, TextCompletionResponse};
pub use embedding::{EmbeddingData, EmbeddingInput, EmbeddingRequest, EmbeddingResponse};
pub use errors::{ErrorDetail, ErrorKind, GatewayError};
pub use image::{ImageData, ImageGenerationRequest, ImageGenerationResponse, ImageSize};
pub use keys::{AzureKeyConfig, BedrockKeyConfig, Key, KeyConfig, SapAiCoreKeyConfig, VertexKeyConfig};
pub use message::{ContentPart, ImageUrl, MessageContent, MessageRole};
pub use model_list::{ListModelsRequest, ListModelsResponse, ModelEntry};
pub use request::{ChunkStream, GatewayRequest, GatewayResponse, StreamChunk};
pub use rerank::{RerankDocument, RerankRequest, RerankResponse, RerankResult, RerankUsage};
pub use responses_api::{
    OutputContent, OutputItem, ResponsesEvent, ResponsesEventType, ResponsesInput,
    ResponsesParams, ResponsesRequest, ResponsesResponse,
};
pub use response::{ChatChoice, ChatChunk, ChatDelta, ChatResponse, ChatStreamChoice};
pub use tools::{
    FunctionCall, FunctionCallDelta, FunctionDefinition, ResponseFormat, Tool, ToolCall,
    ToolCallDelta, ToolChoice,
};
pub use usage::{CacheCreation, CompletionTokensDetails, PromptTokensDetails, Usage};
