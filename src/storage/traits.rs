// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collaborator seams: the search engine client and the document store.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::batching::{BulkAction, BulkInstruction};
use crate::config::HydrateOptions;
use crate::document::Document;
use crate::search::SearchResponse;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Document '{id}' not found in index '{index}'")]
    NotFound { index: String, id: String },
    #[error("Index '{0}' does not exist")]
    IndexNotFound(String),
    #[error("Search engine error: {0}")]
    Engine(String),
    #[error("Document store error: {0}")]
    Store(String),
    #[error("Bulk {action:?} failed for '{id}' in '{index}' (status {status}): {reason}")]
    BulkItem {
        action: BulkAction,
        index: String,
        id: String,
        status: u16,
        reason: String,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}

impl IndexError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound { .. } | IndexError::IndexNotFound(_))
    }
}

/// A single-document index call.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRequest {
    pub index: String,
    pub id: String,
    pub body: Value,
    pub routing: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub body: Value,
    pub routing: Option<String>,
}

/// Per-item outcome inside a bulk response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub action: BulkAction,
    pub index: String,
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItemResult {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Convert a failed item into an error carrying its detail.
    #[must_use]
    pub fn to_error(&self) -> IndexError {
        let reason = match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(detail) => detail
                .get("reason")
                .and_then(Value::as_str)
                .map_or_else(|| detail.to_string(), str::to_string),
            None => String::new(),
        };
        IndexError::BulkItem {
            action: self.action,
            index: self.index.clone(),
            id: self.id.clone(),
            status: self.status,
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|i| i.is_failure())
    }
}

/// Search engine client.
///
/// Timeouts and connection handling belong to the implementation.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Index one document; returns the engine's response body.
    async fn index(&self, request: IndexRequest) -> Result<Value, IndexError>;

    /// Send one bulk request. A transport-level failure is an `Err`; per-item
    /// failures come back inside the response.
    async fn bulk(&self, instructions: Vec<BulkInstruction>) -> Result<BulkResponse, IndexError>;

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, IndexError>;

    async fn count(&self, index: &str, query: Value) -> Result<u64, IndexError>;

    /// Delete one document. A missing document is [`IndexError::NotFound`].
    async fn delete(&self, index: &str, id: &str, routing: Option<&str>) -> Result<(), IndexError>;

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError>;

    async fn create_index(&self, index: &str, settings: Option<Value>) -> Result<(), IndexError>;

    async fn put_mapping(&self, index: &str, mapping: Value) -> Result<(), IndexError>;

    async fn refresh(&self, index: &str) -> Result<(), IndexError>;
}

/// Database side: lookup, streaming, persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Storage name of the collection; the default index name derives from it.
    fn collection_name(&self) -> &str;

    /// All documents whose id is in `ids`, with the options applied verbatim.
    /// Order is the store's own unless `options.sort` is set.
    async fn find_by_ids(&self, ids: &[String], options: &HydrateOptions) -> Result<Vec<Document>, IndexError>;

    /// Cursor over every document matching `filter`, fetched `batch_size` at a time.
    fn stream(&self, filter: Option<Value>, batch_size: usize) -> BoxStream<'static, Result<Document, IndexError>>;

    /// Persist a document, returning the stored form.
    async fn save(&self, doc: &Document) -> Result<Document, IndexError>;

    /// Resolve reference paths in place.
    async fn populate(&self, doc: Document, paths: &[String]) -> Result<Document, IndexError> {
        let _ = paths;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_item_error_reason() {
        let item = BulkItemResult {
            action: BulkAction::Index,
            index: "posts".into(),
            id: "1".into(),
            status: 400,
            error: Some(json!({"type": "mapper_parsing_exception", "reason": "bad field"})),
        };
        assert!(item.is_failure());
        match item.to_error() {
            IndexError::BulkItem { reason, status, .. } => {
                assert_eq!(reason, "bad field");
                assert_eq!(status, 400);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_failures_filter() {
        let response = BulkResponse {
            took: 1,
            errors: true,
            items: vec![
                BulkItemResult { action: BulkAction::Delete, index: "i".into(), id: "a".into(), status: 200, error: None },
                BulkItemResult { action: BulkAction::Index, index: "i".into(), id: "b".into(), status: 500, error: Some(json!("boom")) },
            ],
        };
        let ids: Vec<&str> = response.failures().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(IndexError::NotFound { index: "i".into(), id: "x".into() }.is_not_found());
        assert!(IndexError::IndexNotFound("i".into()).is_not_found());
        assert!(!IndexError::Engine("down".into()).is_not_found());
    }
}
