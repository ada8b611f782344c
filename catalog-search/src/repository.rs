//! Typed repository over a [`SearchEngine`].

use crate::{
    config::SearchConfig,
    decode::{decode_aggregations, decode_hits, decode_page, Aggregations, Page},
    document::Document,
    engine::SearchEngine,
    error::{Result, SearchError},
    index::Mapping,
    query::Query,
    retry::RetryPolicy,
    search::{SearchRequest, Sort, SortOrder, ID_FIELD},
};
use catalog_log::{debug, info, warn};
use serde_json::{json, Value};
use std::{marker::PhantomData, sync::Arc};

/// Hits fetched per request when scanning a whole result set. Stays under
/// the engine's default `max_result_window` of 10 000.
pub const DEFAULT_SCAN_SIZE: usize = 1_000;

/// Largest scan chunk, the engine's default `max_result_window`.
const MAX_SCAN_SIZE: usize = 10_000;

/// Reads and writes documents of type `T` in `T::index_name()`.
///
/// Every engine call runs under the repository's [`RetryPolicy`]. Requests
/// are validated against `T::mapping()` before anything is sent.
pub struct Repository<T: Document> {
    engine: Arc<dyn SearchEngine>,
    policy: RetryPolicy,
    mapping: Mapping,
    refresh_on_write: bool,
    scan_size: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            policy: self.policy.clone(),
            mapping: self.mapping.clone(),
            refresh_on_write: self.refresh_on_write,
            scan_size: self.scan_size,
            _marker: PhantomData,
        }
    }
}

impl<T: Document> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("index", &T::index_name())
            .field("policy", &self.policy)
            .field("refresh_on_write", &self.refresh_on_write)
            .field("scan_size", &self.scan_size)
            .finish()
    }
}

impl<T: Document> Repository<T> {
    /// Repository using `policy` for every call. Writes refresh the index.
    pub fn new(engine: Arc<dyn SearchEngine>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            policy,
            mapping: T::mapping(),
            refresh_on_write: true,
            scan_size: DEFAULT_SCAN_SIZE,
            _marker: PhantomData,
        }
    }

    /// Repository taking its timeout, retry and refresh settings from `config`.
    pub fn with_config(engine: Arc<dyn SearchEngine>, config: &SearchConfig) -> Self {
        Self::new(engine, config.retry_policy()).refresh_on_write(config.refresh_on_write)
    }

    /// Whether writes wait for the index to refresh.
    pub fn refresh_on_write(mut self, enabled: bool) -> Self {
        self.refresh_on_write = enabled;
        self
    }

    /// Hits per request when [`find_all`](Self::find_all) and
    /// [`find_all_matching`](Self::find_all_matching) page through results.
    /// Clamped to `1..=10_000`; must also fit the index's `max_result_window`.
    pub fn scan_size(mut self, size: usize) -> Self {
        self.scan_size = size.clamp(1, MAX_SCAN_SIZE);
        self
    }

    /// Index this repository reads and writes.
    pub fn index_name(&self) -> &'static str {
        T::index_name()
    }

    /// Mapping requests are validated against.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// The engine handle.
    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    /// Create the index with `T::index_settings()`. An existing index is left
    /// untouched.
    pub async fn create_index(&self) -> Result<()> {
        let index = T::index_name();
        let engine = &self.engine;

        if self
            .policy
            .run("index_exists", move || engine.index_exists(index))
            .await?
        {
            info!("Index {} already exists", index);
            return Ok(());
        }

        let body = &T::index_settings().to_json();
        info!("Creating index: {}", index);
        match self
            .policy
            .run("create_index", move || engine.create_index(index, body))
            .await
        {
            // created concurrently since the existence check
            Err(SearchError::AlreadyExists(_)) => {
                info!("Index {} already exists", index);
                Ok(())
            }
            other => other,
        }
    }

    /// Put `T::mapping()` on the index. Repeating it is a no-op.
    pub async fn create_mapping(&self) -> Result<()> {
        let index = T::index_name();
        let engine = &self.engine;
        let body = &self.mapping.to_json();

        info!("Putting mapping for index: {}", index);
        self.policy
            .run("create_mapping", move || engine.put_mapping(index, body))
            .await
    }

    /// Insert or fully replace `doc`.
    pub async fn save(&self, doc: &T) -> Result<()> {
        doc.validate()?;

        let index = T::index_name();
        let engine = &self.engine;
        let id = &doc.id();
        let body = &serde_json::to_value(doc)?;
        let refresh = self.refresh_on_write;

        debug!("Saving document {} in index {}", id, index);
        self.policy
            .run("save", move || engine.index_document(index, id, body, refresh))
            .await
    }

    /// Insert or replace every document in one bulk request. Nothing is sent
    /// unless all documents validate.
    pub async fn save_all(&self, docs: &[T]) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        for doc in docs {
            doc.validate()?;
        }

        let index = T::index_name();
        let engine = &self.engine;
        let refresh = self.refresh_on_write;
        let lines = &docs
            .iter()
            .map(|doc| -> Result<(String, Value)> { Ok((doc.id(), serde_json::to_value(doc)?)) })
            .collect::<Result<Vec<_>>>()?;

        debug!("Bulk saving {} documents in index {}", lines.len(), index);
        let response = self
            .policy
            .run("save_all", move || engine.bulk_index(index, lines, refresh))
            .await?;
        response.into_result()
    }

    /// Fetch a document by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let index = T::index_name();
        let engine = &self.engine;

        debug!("Getting document {} from index {}", id, index);
        let source = self
            .policy
            .run("find_by_id", move || engine.get_document(index, id))
            .await?;

        source
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| SearchError::Decode(format!("document {}: {}", id, e)))
            })
            .transpose()
    }

    /// Every document, ordered by `sorts`.
    pub async fn find_all(&self, sorts: impl IntoIterator<Item = Sort>) -> Result<Vec<T>> {
        self.find_all_matching(Query::MatchAll, sorts).await
    }

    /// Every document matching `query`, ordered by `sorts`.
    ///
    /// Pages through the whole result set with `search_after`,
    /// [`scan_size`](Self::scan_size) hits at a time, so the result is not
    /// capped by the index's `max_result_window`. Documents that tie on
    /// every sort key come back in ascending [`Document::id_field`] order.
    pub async fn find_all_matching(
        &self,
        query: Query,
        sorts: impl IntoIterator<Item = Sort>,
    ) -> Result<Vec<T>> {
        let tiebreak = Sort::Field {
            field: T::id_field().unwrap_or(ID_FIELD).to_string(),
            order: SortOrder::Asc,
        };
        let base = SearchRequest::new()
            .query(query)
            .sorts(sorts)
            .sorts([tiebreak])
            .page(0, self.scan_size);
        base.validate(&self.mapping)?;

        let mut items = Vec::new();
        let mut request = base.clone();
        loop {
            let body = request.build(&self.mapping)?;
            let response = self.run_search("scan", &body).await?;
            let hits = response["hits"]["hits"].as_array().map_or(&[][..], Vec::as_slice);
            let fetched = hits.len();

            let cursor = match hits.last() {
                Some(last) => last["sort"].as_array().cloned().ok_or_else(|| {
                    SearchError::Decode(format!("hit {} has no sort values", last["_id"]))
                })?,
                None => break,
            };
            items.extend(decode_hits::<T>(&response)?);

            if fetched < self.scan_size {
                break;
            }
            request = base.clone().search_after(cursor);
        }

        debug!("Scanned {} documents from index {}", items.len(), T::index_name());
        Ok(items)
    }

    /// Run `request` and decode one page of documents and its aggregations.
    ///
    /// With [`SearchRequest::without_source`] no documents are fetched and
    /// the page carries only totals and aggregations. Partial source filters
    /// cannot be decoded into `T`; use [`search_sources`](Self::search_sources)
    /// for those. A page that starts past the last match is empty, even when
    /// it lies beyond the index's `max_result_window`.
    pub async fn search(&self, request: &SearchRequest) -> Result<Page<T>> {
        if request.source().is_some() && !request.is_source_suppressed() {
            return Err(SearchError::InvalidQuery(format!(
                "partial _source cannot be decoded into {}; use search_sources",
                std::any::type_name::<T>()
            )));
        }
        self.search_page(request).await
    }

    /// Like [`search`](Self::search), but returns each hit's raw (possibly
    /// filtered) `_source` instead of decoding it into `T`.
    pub async fn search_sources(&self, request: &SearchRequest) -> Result<Page<Value>> {
        self.search_page(request).await
    }

    async fn search_page<D: serde::de::DeserializeOwned>(
        &self,
        request: &SearchRequest,
    ) -> Result<Page<D>> {
        let body = request.build(&self.mapping)?;
        let page = request.page_request();

        match self.run_search("search", &body).await {
            Ok(response) => decode_page(&response, page.page, page.size),
            Err(SearchError::ResultWindowTooLarge(reason)) => {
                // Totals and aggregations only, to tell an empty page from a
                // deep one.
                let mut totals = body;
                if let Value::Object(fields) = &mut totals {
                    fields.remove("sort");
                    fields.remove("search_after");
                    fields.insert("from".to_string(), json!(0));
                    fields.insert("size".to_string(), json!(0));
                }
                let response = self.run_search("search", &totals).await?;
                let mut result: Page<D> = decode_page(&response, page.page, page.size)?;
                if (page.offset() as u64) < result.total_elements {
                    warn!("Page {} of size {} is beyond the result window", page.page, page.size);
                    return Err(SearchError::ResultWindowTooLarge(reason));
                }
                result.items.clear();
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the aggregations of `request` without fetching documents.
    pub async fn aggregate(&self, request: &SearchRequest) -> Result<Aggregations> {
        if request.aggregations().is_empty() {
            return Err(SearchError::InvalidAggregation(
                "request has no aggregations".to_string(),
            ));
        }

        let mut body = request.build(&self.mapping)?;
        if let Value::Object(fields) = &mut body {
            fields.remove("sort");
            fields.remove("_source");
            fields.insert("from".to_string(), json!(0));
            fields.insert("size".to_string(), json!(0));
        }

        let response = self.run_search("aggregate", &body).await?;
        decode_aggregations(&response)
    }

    /// Number of documents matching `query`.
    pub async fn count(&self, query: &Query) -> Result<u64> {
        query.validate(&self.mapping)?;

        let index = T::index_name();
        let engine = &self.engine;
        let body = &query.to_json();

        debug!("Counting documents in index {}", index);
        self.policy
            .run("count", move || engine.count(index, body))
            .await
    }

    /// Make recent writes visible to search.
    pub async fn refresh(&self) -> Result<()> {
        let index = T::index_name();
        let engine = &self.engine;
        self.policy
            .run("refresh", move || engine.refresh(index))
            .await
    }

    async fn run_search(&self, operation: &str, body: &Value) -> Result<Value> {
        let index = T::index_name();
        let engine = &self.engine;

        debug!("Searching index {}: {}", index, body);
        self.policy
            .run(operation, move || engine.search(index, body))
            .await
    }
}
