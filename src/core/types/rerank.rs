//! Rerank types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::common::{is_default_extra, Provider, ResponseExtraFields};

/// A document to rank. Documents carrying only text are sent to providers
/// as plain strings; documents with an ID or metadata are JSON-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankDocument {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

impl RerankDocument {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: content.into(),
            id: None,
            meta: None,
        }
    }

    pub fn is_plain(&self) -> bool {
        self.id.is_none() && self.meta.is_none()
    }
}

impl From<&str> for RerankDocument {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RerankParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_doc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(flatten, default)]
    pub extra_params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankRequest {
    pub provider: Provider,
    pub model: String,
    pub query: String,
    pub documents: Vec<RerankDocument>,
    #[serde(default)]
    pub params: RerankParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
    /// Original position of the document in the request.
    pub index: u32,
    pub relevance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<RerankDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RerankUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_units: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResponse {
    pub id: String,
    /// Sorted descending by relevance score, ties broken by ascending index.
    pub results: Vec<RerankResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<RerankUsage>,
    #[serde(default, skip_serializing_if = "is_default_extra")]
    pub extra_fields: ResponseExtraFields,
}

/// Deterministic result ordering: `(relevance_score desc, index asc)`.
pub fn sort_results(results: &mut [RerankResult]) {
    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: u32, score: f64) -> RerankResult {
        RerankResult {
            index,
            relevance_score: score,
            document: None,
        }
    }

    #[test]
    fn test_sort_tie_break_on_index() {
        let mut results = vec![result(2, 0.21), result(1, 0.95), result(0, 0.95)];
        sort_results(&mut results);
        let order: Vec<(u32, f64)> = results
            .iter()
            .map(|r| (r.index, r.relevance_score))
            .collect();
        assert_eq!(order, vec![(0, 0.95), (1, 0.95), (2, 0.21)]);
    }

    #[test]
    fn test_plain_document_detection() {
        assert!(RerankDocument::text("hello").is_plain());
        let mut doc = RerankDocument::text("hello");
        doc.id = Some("d1".to_string());
        assert!(!doc.is_plain());
    }
}
