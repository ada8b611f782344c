//! Bulk indexing request lines and responses.

use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Action/source line pairs for indexing `docs` into `index`.
pub fn index_lines(index: &str, docs: &[(String, Value)]) -> Vec<Value> {
    let mut lines = Vec::with_capacity(docs.len() * 2);
    for (id, doc) in docs {
        lines.push(json!({ "index": { "_index": index, "_id": id } }));
        lines.push(doc.clone());
    }
    lines
}

/// Bulk operation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Time taken in milliseconds.
    #[serde(default)]
    pub took: u64,
    /// Whether any item failed.
    pub errors: bool,
    /// Per-item results, in request order.
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Number of items the engine accepted, or [`SearchError::Bulk`] if any failed.
    pub fn into_result(self) -> Result<usize> {
        let total = self.items.len();
        let errors: Vec<String> = self
            .items
            .iter()
            .filter(|item| !item.index.is_success())
            .map(|item| {
                let reason = item
                    .index
                    .error
                    .as_ref()
                    .map(|e| format!("{}: {}", e.error_type, e.reason))
                    .unwrap_or_else(|| format!("status {}", item.index.status));
                format!("{}: {}", item.index.id, reason)
            })
            .collect();

        if errors.is_empty() && !self.errors {
            return Ok(total);
        }

        let failed = errors.len().max(1);
        Err(SearchError::Bulk {
            succeeded: total.saturating_sub(failed),
            failed,
            errors,
        })
    }
}

/// Individual bulk item result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
    /// Outcome of the index action.
    pub index: BulkItemStatus,
}

/// Status of a bulk item operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemStatus {
    /// Index name.
    #[serde(rename = "_index")]
    pub index: String,
    /// Document ID.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// `created` or `updated`.
    #[serde(default)]
    pub result: Option<String>,
    /// HTTP status code.
    pub status: u16,
    /// Error details.
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

/// Bulk item error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error reason.
    pub reason: String,
}

impl BulkItemStatus {
    /// Check if the operation was successful.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.error.is_none()
    }
}
