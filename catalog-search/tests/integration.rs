//! Integration tests for catalog-search

use async_trait::async_trait;
use catalog_search::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    isbn: String,
    title: String,
    publisher: String,
    pages: i64,
}

impl Document for Book {
    fn index_name() -> &'static str {
        "books"
    }

    fn mapping() -> Mapping {
        Mapping::new()
            .field("isbn", MappingField::keyword())
            .field("title", MappingField::text())
            .field("publisher", MappingField::keyword())
            .field("pages", MappingField::long())
    }

    fn index_settings() -> IndexSettings {
        IndexSettings::new().shards(1).replicas(0)
    }

    fn id(&self) -> String {
        self.isbn.clone()
    }

    fn id_field() -> Option<&'static str> {
        Some("isbn")
    }
}

fn book(isbn: &str, title: &str, publisher: &str, pages: i64) -> Book {
    Book {
        isbn: isbn.into(),
        title: title.into(),
        publisher: publisher.into(),
        pages,
    }
}

fn library() -> Vec<Book> {
    vec![
        book("1", "The Rust Programming Language", "No Starch", 560),
        book("2", "Rust in Action", "Manning", 456),
        book("3", "Programming Rust", "O'Reilly", 738),
        book("4", "Zero To Production In Rust", "Self", 549),
        book("5", "Rust for Rustaceans", "No Starch", 280),
    ]
}

async fn seeded(engine: Arc<dyn SearchEngine>) -> Repository<Book> {
    let repo = Repository::new(engine, RetryPolicy::no_retry(Duration::from_secs(1)));
    repo.create_index().await.unwrap();
    repo.create_mapping().await.unwrap();
    repo.save_all(&library()).await.unwrap();
    repo
}

// =============================================================================
// Searching
// =============================================================================

#[tokio::test]
async fn test_paging_covers_every_match() {
    let repo = seeded(Arc::new(InMemoryEngine::new())).await;
    let request = SearchRequest::new().sort("pages", SortOrder::Asc);

    let first = repo.search(&request.clone().page(0, 3)).await.unwrap();
    let second = repo.search(&request.clone().page(1, 3)).await.unwrap();
    let beyond = repo.search(&request.page(5, 3)).await.unwrap();

    assert_eq!((first.items.len(), second.items.len()), (3, 2));
    assert_eq!(first.total_pages, 2);
    assert!(first.has_next() && !second.has_next());
    assert!(beyond.is_empty());
    assert_eq!(beyond.total_elements, 5);
}

#[tokio::test]
async fn test_match_then_keyword_filter() {
    let repo = seeded(Arc::new(InMemoryEngine::new())).await;
    let query = Query::bool()
        .must(Query::matching("title", "rust programming"))
        .filter(Query::term("publisher", "No Starch"))
        .build();

    let page = repo.search(&SearchRequest::new().query(query)).await.unwrap();
    let isbns: Vec<&str> = page.items.iter().map(|b| b.isbn.as_str()).collect();
    assert_eq!(isbns, vec!["1", "5"]);
}

#[tokio::test]
async fn test_aggregation_decodes_nested_metrics() {
    let repo = seeded(Arc::new(InMemoryEngine::new())).await;
    let request = SearchRequest::new().aggregation(
        "publishers",
        Aggregation::terms("publisher").sub_aggregation("avgPages", Aggregation::avg("pages")),
    );

    let aggs = repo.aggregate(&request).await.unwrap();
    let no_starch = aggs.get("publishers").unwrap().bucket("No Starch").unwrap();
    assert_eq!(no_starch.doc_count, 2);
    assert_eq!(no_starch.metric("avgPages").unwrap(), Some(420.0));
    assert!(matches!(aggs.get("missing"), Err(SearchError::AggregationNotFound(_))));
}

// =============================================================================
// Timeouts and retries
// =============================================================================

/// Delegates to an in-memory engine after an optional delay, failing the
/// first `failures` searches as unreachable.
struct Unreliable {
    inner: InMemoryEngine,
    delay: Duration,
    failures: u32,
    searches: AtomicU32,
}

impl Unreliable {
    fn new(inner: InMemoryEngine, delay: Duration, failures: u32) -> Self {
        Self {
            inner,
            delay,
            failures,
            searches: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SearchEngine for Unreliable {
    async fn create_index(&self, index: &str, settings: &Value) -> Result<()> {
        self.inner.create_index(index, settings).await
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.inner.index_exists(index).await
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        self.inner.put_mapping(index, mapping).await
    }

    async fn index_document(&self, index: &str, id: &str, doc: &Value, refresh: bool) -> Result<()> {
        self.inner.index_document(index, id, doc, refresh).await
    }

    async fn bulk_index(
        &self,
        index: &str,
        docs: &[(String, Value)],
        refresh: bool,
    ) -> Result<BulkResponse> {
        self.inner.bulk_index(index, docs, refresh).await
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>> {
        self.inner.get_document(index, id).await
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let attempt = self.searches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if attempt < self.failures {
            return Err(SearchError::EngineUnavailable("connection refused".into()));
        }
        self.inner.search(index, body).await
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        self.inner.count(index, query).await
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.inner.refresh(index).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_engine_times_out_after_retries() {
    let memory = InMemoryEngine::new();
    seeded(Arc::new(memory.clone())).await;

    let engine = Arc::new(Unreliable::new(memory, Duration::from_secs(5), 0));
    let policy = RetryPolicy {
        timeout: Duration::from_millis(200),
        max_retries: 2,
        backoff: BackoffStrategy::Constant(Duration::from_millis(10)),
    };
    let repo: Repository<Book> = Repository::new(engine.clone(), policy);

    let err = repo.search(&SearchRequest::new()).await.unwrap_err();
    assert!(matches!(err, SearchError::Timeout));
    assert_eq!(engine.searches.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_engine_recovers_within_retries() {
    let memory = InMemoryEngine::new();
    seeded(Arc::new(memory.clone())).await;

    let engine = Arc::new(Unreliable::new(memory, Duration::ZERO, 2));
    let policy = RetryPolicy {
        timeout: Duration::from_secs(1),
        max_retries: 3,
        backoff: BackoffStrategy::default(),
    };
    let repo: Repository<Book> = Repository::new(engine.clone(), policy);

    let page = repo.search(&SearchRequest::new()).await.unwrap();
    assert_eq!(page.total_elements, 5);
    assert_eq!(engine.searches.load(Ordering::SeqCst), 3);
}

// =============================================================================
// OpenSearch
// =============================================================================

#[test]
fn test_opensearch_engine_rejects_bad_config() {
    assert!(OpenSearchEngine::new(&SearchConfig::cluster(vec![])).is_err());
    assert!(OpenSearchEngine::new(&SearchConfig::new("not a url")).is_err());
    assert!(OpenSearchEngine::new(&SearchConfig::new("http://localhost:9200")).is_ok());
}

#[tokio::test]
async fn test_unreachable_cluster_is_unavailable() {
    let config = SearchConfig::new("http://127.0.0.1:1")
        .with_request_timeout(Duration::from_secs(2))
        .with_max_retries(0);
    let engine = Arc::new(OpenSearchEngine::new(&config).unwrap());
    let repo: Repository<Book> = Repository::with_config(engine, &config);

    let err = repo.find_by_id("1").await.unwrap_err();
    assert!(err.is_retryable(), "unexpected error: {err}");
}

/// Needs a running cluster: `CATALOG_SEARCH_URL=http://localhost:9200 cargo test -- --ignored`
#[tokio::test]
#[ignore]
async fn test_live_cluster_round_trip() {
    let config = SearchConfig::from_env().unwrap();
    let engine: Arc<dyn SearchEngine> = Arc::new(OpenSearchEngine::new(&config).unwrap());
    let repo = Repository::<Book>::with_config(engine.clone(), &config);

    repo.create_index().await.unwrap();
    repo.create_mapping().await.unwrap();
    repo.save_all(&library()).await.unwrap();
    repo.refresh().await.unwrap();

    assert_eq!(repo.find_by_id("2").await.unwrap(), Some(library()[1].clone()));
    let range: Query = Query::range("pages").gte(450).lte(560).into();
    assert_eq!(repo.count(&range).await.unwrap(), 3);

    let raw = engine
        .search("books", &json!({ "size": 0, "query": { "match_all": {} } }))
        .await
        .unwrap();
    assert_eq!(decode_total(&raw), 5);
}
