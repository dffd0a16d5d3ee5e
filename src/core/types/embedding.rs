//! Embedding types.

use serde::{Deserialize, Serialize};

use super::common::{is_default_extra, Provider, ResponseExtraFields};
use super::usage::Usage;

/// Embedding input: a single string or an ordered batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    pub fn texts(&self) -> Vec<&str> {
        match self {
            EmbeddingInput::Single(text) => vec![text.as_str()],
            EmbeddingInput::Batch(texts) => texts.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EmbeddingInput::Single(text) => text.is_empty(),
            EmbeddingInput::Batch(texts) => texts.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(flatten, default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

impl Default for EmbeddingParams {
    fn default() -> Self {
        Self {
            dimensions: None,
            encoding_format: None,
            user: None,
            extra_params: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub provider: Provider,
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(default)]
    pub params: EmbeddingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    /// Always `embedding`.
    pub object: String,
    pub index: u32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Always `list`.
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}
