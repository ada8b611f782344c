//! The seam between repositories and a search engine.
//!
//! Engines speak the engine's JSON dialect: repositories hand them rendered
//! request bodies and decode whatever comes back.

use crate::{bulk::BulkResponse, error::Result};
use async_trait::async_trait;
use serde_json::Value;

mod memory;
mod opensearch;

pub use memory::InMemoryEngine;
pub use self::opensearch::OpenSearchEngine;

/// Operations a repository needs from a search engine.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create `index` with a settings body. Fails with
    /// [`SearchError::AlreadyExists`](crate::SearchError::AlreadyExists)
    /// if it is already there.
    async fn create_index(&self, index: &str, settings: &Value) -> Result<()>;

    /// Whether `index` exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Add field mappings to an existing index.
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()>;

    /// Insert or fully replace one document.
    async fn index_document(&self, index: &str, id: &str, doc: &Value, refresh: bool) -> Result<()>;

    /// Insert or replace many documents in one request.
    async fn bulk_index(
        &self,
        index: &str,
        docs: &[(String, Value)],
        refresh: bool,
    ) -> Result<BulkResponse>;

    /// The stored source of a document, if present.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>>;

    /// Run a search body and return the raw response.
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;

    /// Number of documents matching a query body.
    async fn count(&self, index: &str, query: &Value) -> Result<u64>;

    /// Make recent writes visible to search.
    async fn refresh(&self, index: &str) -> Result<()>;
}
