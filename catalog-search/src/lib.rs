//! Typed document repositories over OpenSearch.
//!
//! This crate provides:
//! - A [`Document`] trait tying a record type to its index, settings and mapping
//! - Query and aggregation builders validated against that mapping
//! - Decoding of search responses into pages, buckets and metrics
//! - A [`SearchEngine`] seam with an OpenSearch client and an in-memory engine
//! - Per-call timeout and bounded retry
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_search::{
//!     Aggregation, Document, InMemoryEngine, Mapping, MappingField, Query, Repository,
//!     RetryPolicy, SearchRequest, SortOrder,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Article {
//!     slug: String,
//!     title: String,
//!     section: String,
//!     words: i64,
//! }
//!
//! impl Document for Article {
//!     fn index_name() -> &'static str {
//!         "articles"
//!     }
//!
//!     fn mapping() -> Mapping {
//!         Mapping::new()
//!             .field("slug", MappingField::keyword())
//!             .field("title", MappingField::text())
//!             .field("section", MappingField::keyword())
//!             .field("words", MappingField::long())
//!     }
//!
//!     fn id(&self) -> String {
//!         self.slug.clone()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(InMemoryEngine::new());
//!     let articles: Repository<Article> = Repository::new(engine, RetryPolicy::default());
//!
//!     articles.create_index().await?;
//!     articles.create_mapping().await?;
//!
//!     let page = articles
//!         .search(
//!             &SearchRequest::new()
//!                 .query(Query::matching("title", "getting started"))
//!                 .sort("words", SortOrder::Desc)
//!                 .page(0, 5),
//!         )
//!         .await?;
//!     println!("{} of {} articles", page.items.len(), page.total_elements);
//!
//!     let stats = articles
//!         .aggregate(&SearchRequest::new().aggregation(
//!             "sections",
//!             Aggregation::terms("section").sub_aggregation("length", Aggregation::avg("words")),
//!         ))
//!         .await?;
//!     for bucket in stats.buckets("sections")? {
//!         println!("{}: {:?}", bucket.key, bucket.metric("length")?);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod aggregation;
mod bulk;
mod config;
mod decode;
mod document;
mod engine;
mod error;
mod index;
mod query;
mod repository;
mod retry;
mod search;

pub use aggregation::{Aggregation, AggregationKind};
pub use bulk::{BulkItem, BulkItemError, BulkItemStatus, BulkResponse};
pub use config::{SearchConfig, ENV_PREFIX};
pub use decode::{
    decode_aggregations, decode_buckets, decode_hits, decode_page, decode_total,
    AggregationResult, Aggregations, Bucket, MetricResult, Page, TermsResult,
};
pub use document::Document;
pub use engine::{InMemoryEngine, OpenSearchEngine, SearchEngine};
pub use error::{Result, SearchError};
pub use index::{FieldType, IndexSettings, Mapping, MappingField};
pub use query::{BoolQuery, BoolQueryBuilder, MatchQuery, Query, RangeQuery, TermQuery};
pub use repository::{Repository, DEFAULT_SCAN_SIZE};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use search::{
    PageRequest, SearchRequest, Sort, SortOrder, SourceFilter, DEFAULT_PAGE_SIZE, ID_FIELD,
};
