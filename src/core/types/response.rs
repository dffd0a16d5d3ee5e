//! Unified chat response and stream-chunk types.

use serde::{Deserialize, Serialize};

use super::chat::ChatMessage;
use super::common::{is_default_extra, FinishReason, ResponseExtraFields};
use super::message::MessageRole;
use super::tools::ToolCallDelta;
use super::usage::Usage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider-assigned where available, otherwise server-minted.
    pub id: String,
    /// Always `chat.completion`.
    pub object: String,
    pub created: i64,
    /// Resolved/effective model name.
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

impl ChatResponse {
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: Vec::new(),
            usage: None,
            system_fingerprint: None,
            extra_fields: ResponseExtraFields::default(),
        }
    }
}

/// Incremental content on a stream choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning/thinking text, for providers that stream it separately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChoice {
    pub index: u32,
    pub delta: ChatDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One element of a chat (or text-completion) stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    /// Always `chat.completion.chunk`.
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

impl ChatChunk {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.into(),
            choices: Vec::new(),
            usage: None,
            extra_fields: ResponseExtraFields::default(),
        }
    }

    pub fn with_delta(mut self, delta: ChatDelta) -> Self {
        self.choices.push(ChatStreamChoice {
            index: 0,
            delta,
            finish_reason: None,
        });
        self
    }

    pub fn with_finish(mut self, finish_reason: FinishReason) -> Self {
        self.choices.push(ChatStreamChoice {
            index: 0,
            delta: ChatDelta::default(),
            finish_reason: Some(finish_reason),
        });
        self
    }

    pub fn content_delta(id: impl Into<String>, model: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, model).with_delta(ChatDelta {
            content: Some(text.into()),
            ..Default::default()
        })
    }
}
