//! Legacy text-completion types.

use serde::{Deserialize, Serialize};

use super::chat::ChatParams;
use super::common::{is_default_extra, FinishReason, Provider, ResponseExtraFields};
use super::usage::Usage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCompletionRequest {
    pub provider: Provider,
    pub model: String,
    /// Single prompt string.
    pub input: String,
    #[serde(default)]
    pub params: ChatParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionChoice {
    pub index: u32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionResponse {
    pub id: String,
    /// Always `text_completion`.
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextCompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}
