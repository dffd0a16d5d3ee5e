//! Shared identifiers, metadata, and constants.

use serde::{Deserialize, Serialize};

/// Buffer capacity of every stream output channel. A slow consumer fills the
/// channel, blocks the reader task, and in turn blocks the wire.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 100;

/// Upper bound on how much of an upstream error body is captured.
pub const MAX_ERROR_BODY_BYTES: usize = 512 * 1024;

/// Page size used when listing models from providers that paginate.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Canonical provider identifier. Stamped into every response's extra
/// fields so callers always know which backend actually served a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Azure,
    Bedrock,
    Vertex,
    Cohere,
    Gemini,
    HuggingFace,
    Nebius,
    Zai,
    SapAiCore,
    /// An arbitrary OpenAI-compatible endpoint, identified by caller-chosen name.
    Custom(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Azure => "azure",
            Provider::Bedrock => "bedrock",
            Provider::Vertex => "vertex",
            Provider::Cohere => "cohere",
            Provider::Gemini => "gemini",
            Provider::HuggingFace => "huggingface",
            Provider::Nebius => "nebius",
            Provider::Zai => "zai",
            Provider::SapAiCore => "sap-ai-core",
            Provider::Custom(name) => name,
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider::OpenAi
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Provider {
    fn from(s: &str) -> Self {
        match s {
            "openai" => Provider::OpenAi,
            "anthropic" => Provider::Anthropic,
            "azure" => Provider::Azure,
            "bedrock" => Provider::Bedrock,
            "vertex" => Provider::Vertex,
            "cohere" => Provider::Cohere,
            "gemini" => Provider::Gemini,
            "huggingface" => Provider::HuggingFace,
            "nebius" => Provider::Nebius,
            "zai" => Provider::Zai,
            "sap-ai-core" => Provider::SapAiCore,
            other => Provider::Custom(other.to_string()),
        }
    }
}

impl Serialize for Provider {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Provider::from(s.as_str()))
    }
}

/// The operation a request represents. Every provider capability maps to one
/// of these; unsupported ones are gated synchronously at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    ChatCompletion,
    ChatCompletionStream,
    TextCompletion,
    TextCompletionStream,
    Responses,
    ResponsesStream,
    Embedding,
    Rerank,
    ImageGeneration,
    ImageGenerationStream,
    ImageEdit,
    ImageEditStream,
    ImageVariation,
    Speech,
    SpeechStream,
    Transcription,
    TranscriptionStream,
    CountTokens,
    ListModels,
    Files,
    Batches,
    Containers,
    Video,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ChatCompletion => "chat_completion",
            RequestType::ChatCompletionStream => "chat_completion_stream",
            RequestType::TextCompletion => "text_completion",
            RequestType::TextCompletionStream => "text_completion_stream",
            RequestType::Responses => "responses",
            RequestType::ResponsesStream => "responses_stream",
            RequestType::Embedding => "embedding",
            RequestType::Rerank => "rerank",
            RequestType::ImageGeneration => "image_generation",
            RequestType::ImageGenerationStream => "image_generation_stream",
            RequestType::ImageEdit => "image_edit",
            RequestType::ImageEditStream => "image_edit_stream",
            RequestType::ImageVariation => "image_variation",
            RequestType::Speech => "speech",
            RequestType::SpeechStream => "speech_stream",
            RequestType::Transcription => "transcription",
            RequestType::TranscriptionStream => "transcription_stream",
            RequestType::CountTokens => "count_tokens",
            RequestType::ListModels => "list_models",
            RequestType::Files => "files",
            RequestType::Batches => "batches",
            RequestType::Containers => "containers",
            RequestType::Video => "video",
        }
    }

    /// Whether the operation produces a chunk stream rather than a single response.
    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            RequestType::ChatCompletionStream
                | RequestType::TextCompletionStream
                | RequestType::ResponsesStream
                | RequestType::ImageGenerationStream
                | RequestType::ImageEditStream
                | RequestType::SpeechStream
                | RequestType::TranscriptionStream
        )
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized completion finish reason. Native values outside the normalized
/// set pass through in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(s) => s,
        }
    }
}

impl From<&str> for FinishReason {
    fn from(s: &str) -> Self {
        match s {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FinishReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(FinishReason::from(s.as_str()))
    }
}

/// Gateway-attached metadata carried on every response and chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseExtraFields {
    /// Provider that actually served the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// Model name as the caller requested it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_requested: Option<String>,
    /// Deployment identifier, for gateway providers that resolve one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_deployment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<RequestType>,
    /// Wall-clock latency in milliseconds. For chunks this is the gap since
    /// the previous chunk; the final chunk carries overall stream latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Zero-based position of a chunk within its stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u64>,
    /// The provider's raw response body. Populated only when the caller
    /// opted in via the request context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    /// The native request payload as sent. Opt-in, like `raw_response`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_request: Option<serde_json::Value>,
}

/// Result of a native token-count operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountTokensResponse {
    pub input_tokens: u32,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

pub(crate) fn is_default_extra(extra: &ResponseExtraFields) -> bool {
    extra.provider.is_none()
        && extra.model_requested.is_none()
        && extra.model_deployment.is_none()
        && extra.request_type.is_none()
        && extra.latency_ms.is_none()
        && extra.chunk_index.is_none()
        && extra.raw_response.is_none()
        && extra.raw_request.is_none()
}
