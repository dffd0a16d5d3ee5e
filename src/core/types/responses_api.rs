//! Responses API types: output items and lifecycle stream events.
//!
//! The output of a responses request is an ordered sequence of items
//! (messages, reasoning items, code-interpreter calls, tool calls). Reasoning
//! items carry encrypted signatures that must round-trip unchanged.

use serde::{Deserialize, Serialize};

use super::common::{is_default_extra, Provider, ResponseExtraFields};
use super::tools::{Tool, ToolChoice};
use super::usage::Usage;

/// Responses input: a bare prompt or a sequence of input items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<OutputItem>),
}

impl ResponsesInput {
    pub fn is_empty(&self) -> bool {
        match self {
            ResponsesInput::Text(text) => text.is_empty(),
            ResponsesInput::Items(items) => items.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Reasoning controls (`{"effort": "high"}` and friends).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<serde_json::Value>,
    /// Extra output to include, e.g. `reasoning.encrypted_content`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(flatten, default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub provider: Provider,
    pub model: String,
    pub input: ResponsesInput,
    #[serde(default)]
    pub params: ResponsesParams,
}

/// One item in a responses output (or input) sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        content: Vec<OutputContent>,
    },
    Reasoning {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        summary: Vec<serde_json::Value>,
        /// Opaque provider signature. Round-trips byte-for-byte.
        #[serde(skip_serializing_if = "Option::is_none")]
        encrypted_content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    CodeInterpreterCall {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        outputs: Vec<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    FunctionCallOutput {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        call_id: String,
        output: String,
    },
}

/// One content part of a message output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annotations: Vec<serde_json::Value>,
        /// Opaque signature attached to this specific block by providers
        /// that sign streamed thought content. Round-trips verbatim.
        #[serde(skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    InputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    /// Always `response`.
    pub object: String,
    pub created_at: i64,
    pub status: String,
    pub model: String,
    pub output: Vec<OutputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Normalized finish reason, populated on terminal lifecycle events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<crate::core::types::common::FinishReason>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

/// Lifecycle event types, in canonical stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsesEventType {
    #[serde(rename = "response.created")]
    Created,
    #[serde(rename = "response.in_progress")]
    InProgress,
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded,
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded,
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta,
    #[serde(rename = "response.output_text.done")]
    OutputTextDone,
    #[serde(rename = "response.content_part.done")]
    ContentPartDone,
    #[serde(rename = "response.output_item.done")]
    OutputItemDone,
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "response.failed")]
    Failed,
}

/// One event of a responses stream. Providers that natively stream these
/// pass them through; providers that only stream deltas get the lifecycle
/// synthesized around their text chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesEvent {
    #[serde(rename = "type")]
    pub event_type: ResponsesEventType,
    /// Monotonic position of this event within its stream.
    pub sequence_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponsesResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<OutputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<OutputContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

impl ResponsesEvent {
    pub fn new(event_type: ResponsesEventType, sequence_number: u64) -> Self {
        Self {
            event_type,
            sequence_number,
            response: None,
            item: None,
            item_id: None,
            output_index: None,
            content_index: None,
            part: None,
            delta: None,
            text: None,
            extra_fields: ResponseExtraFields::default(),
        }
    }
}
