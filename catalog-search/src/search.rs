//! Search request builder.
//!
//! A [`SearchRequest`] is plain data: building one never talks to the
//! engine. [`SearchRequest::build`] validates it against a [`Mapping`] and
//! renders the request body that a repository then sends.

use crate::{
    aggregation::{scope_to_json, validate_scope, Aggregation},
    error::{Result, SearchError},
    index::{Mapping, MappingField},
    query::Query,
};
use serde_json::{json, Value};

/// Page size used when a request does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Engine metadata field holding the document id. Sortable without a mapping.
pub const ID_FIELD: &str = "_id";

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum Sort {
    /// Sort by a mapped field.
    Field {
        /// Field name.
        field: String,
        /// Direction.
        order: SortOrder,
    },
    /// Sort by relevance.
    Score(SortOrder),
}

impl Sort {
    /// Ascending on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Sort::Field {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Sort::Field {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Sort::Field { field, order } => json!({ field: { "order": order.as_str() } }),
            Sort::Score(order) => json!({ "_score": { "order": order.as_str() } }),
        }
    }
}

/// Zero-based page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page index, starting at 0.
    pub page: usize,
    /// Items per page.
    pub size: usize,
}

impl PageRequest {
    /// Page `page` of `size` items.
    pub fn of(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Offset of the first item.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::of(0, DEFAULT_PAGE_SIZE)
    }
}

/// Which stored fields come back with each hit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceFilter {
    /// Only these fields. An empty string entry, alone, returns nothing.
    pub includes: Vec<String>,
    /// Never these fields.
    pub excludes: Vec<String>,
}

impl SourceFilter {
    /// Filter keeping `includes` and dropping `excludes`.
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self { includes, excludes }
    }

    /// Return no stored fields at all.
    pub fn none() -> Self {
        Self::new(vec![String::new()], Vec::new())
    }

    /// Whether this filter drops every stored field.
    pub fn is_none(&self) -> bool {
        self.excludes.is_empty() && !self.includes.is_empty() && self.includes.iter().all(String::is_empty)
    }

    fn to_json(&self) -> Value {
        let mut source = serde_json::Map::new();
        if !self.includes.is_empty() {
            source.insert("includes".to_string(), json!(self.includes));
        }
        if !self.excludes.is_empty() {
            source.insert("excludes".to_string(), json!(self.excludes));
        }
        Value::Object(source)
    }
}

/// Search request builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    query: Option<Query>,
    sort: Vec<Sort>,
    page: Option<PageRequest>,
    source: Option<SourceFilter>,
    aggregations: Vec<(String, Aggregation)>,
    search_after: Option<Vec<Value>>,
}

impl SearchRequest {
    /// Create an empty request (match all, default paging).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query.
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Add a sort key; earlier keys take priority.
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(Sort::Field {
            field: field.into(),
            order,
        });
        self
    }

    /// Add several sort keys.
    pub fn sorts(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        self.sort.extend(sorts);
        self
    }

    /// Sort by score (relevance).
    pub fn sort_by_score(mut self, order: SortOrder) -> Self {
        self.sort.push(Sort::Score(order));
        self
    }

    /// Request page `page_index` (zero-based) of `page_size` items.
    pub fn page(mut self, page_index: usize, page_size: usize) -> Self {
        self.page = Some(PageRequest::of(page_index, page_size));
        self
    }

    /// Restrict the stored fields returned with each hit.
    pub fn source_filter(mut self, includes: Vec<String>, excludes: Vec<String>) -> Self {
        self.source = Some(SourceFilter::new(includes, excludes));
        self
    }

    /// Fetch no documents at all: the body asks for zero hits, so only the
    /// totals and aggregations come back.
    pub fn without_source(mut self) -> Self {
        self.source = Some(SourceFilter::none());
        self
    }

    /// Continue after the hit whose `sort` values are `after`. Requires at
    /// least one sort key; the page index is ignored and the body starts
    /// at offset 0.
    pub fn search_after(mut self, after: Vec<Value>) -> Self {
        self.search_after = Some(after);
        self
    }

    /// Add a top-level aggregation.
    pub fn aggregation(mut self, name: impl Into<String>, agg: Aggregation) -> Self {
        self.aggregations.push((name.into(), agg));
        self
    }

    /// The query, or `None` for match-all.
    pub fn query_ref(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Requested page, or the default page.
    pub fn page_request(&self) -> PageRequest {
        self.page.unwrap_or_default()
    }

    /// The source filter, if one was set.
    pub fn source(&self) -> Option<&SourceFilter> {
        self.source.as_ref()
    }

    /// Whether hits come back without any stored fields.
    pub fn is_source_suppressed(&self) -> bool {
        self.source.as_ref().is_some_and(SourceFilter::is_none)
    }

    /// Top-level aggregations in insertion order.
    pub fn aggregations(&self) -> &[(String, Aggregation)] {
        &self.aggregations
    }

    /// Validate every field reference against `mapping`.
    pub fn validate(&self, mapping: &Mapping) -> Result<()> {
        if let Some(query) = &self.query {
            query.validate(mapping)?;
        }

        for sort in &self.sort {
            if let Sort::Field { field, .. } = sort {
                if field == ID_FIELD {
                    continue;
                }
                let definition = mapping.get(field).ok_or_else(|| {
                    SearchError::InvalidQuery(format!("unknown sort field '{}'", field))
                })?;
                if !MappingField::is_aggregatable(definition) {
                    return Err(SearchError::InvalidQuery(format!(
                        "cannot sort on {} field '{}'",
                        definition.field_type.as_str(),
                        field
                    )));
                }
            }
        }

        if let Some(page) = &self.page {
            if page.size == 0 {
                return Err(SearchError::InvalidQuery(
                    "page size must be greater than zero".to_string(),
                ));
            }
        }

        if self.search_after.is_some() && self.sort.is_empty() {
            return Err(SearchError::InvalidQuery(
                "search_after needs at least one sort key".to_string(),
            ));
        }

        if let Some(source) = &self.source {
            for field in source.includes.iter().chain(&source.excludes) {
                if !field.is_empty() && !field.contains('*') && mapping.get(field).is_none() {
                    return Err(SearchError::InvalidQuery(format!(
                        "unknown source field '{}'",
                        field
                    )));
                }
            }
        }

        validate_scope(&self.aggregations, mapping)
    }

    /// Validate against `mapping` and render the request body.
    pub fn build(&self, mapping: &Mapping) -> Result<Value> {
        self.validate(mapping)?;
        Ok(self.to_json())
    }

    fn to_json(&self) -> Value {
        let mut body = serde_json::Map::new();
        let page = self.page_request();

        body.insert(
            "query".to_string(),
            self.query.as_ref().unwrap_or(&Query::MatchAll).to_json(),
        );
        let from = if self.search_after.is_some() { 0 } else { page.offset() };
        let size = if self.is_source_suppressed() { 0 } else { page.size };
        body.insert("from".to_string(), json!(from));
        body.insert("size".to_string(), json!(size));
        body.insert("track_total_hits".to_string(), json!(true));

        if !self.sort.is_empty() {
            body.insert(
                "sort".to_string(),
                Value::Array(self.sort.iter().map(Sort::to_json).collect()),
            );
        }

        if let Some(source) = &self.source {
            body.insert("_source".to_string(), source.to_json());
        }

        if let Some(after) = &self.search_after {
            body.insert("search_after".to_string(), Value::Array(after.clone()));
        }

        if !self.aggregations.is_empty() {
            body.insert("aggs".to_string(), scope_to_json(&self.aggregations));
        }

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MappingField;

    fn mapping() -> Mapping {
        Mapping::new()
            .field("title", MappingField::text())
            .field("brand", MappingField::keyword())
            .field("price", MappingField::double())
            .field("images", MappingField::keyword().not_indexed())
    }

    #[test]
    fn test_default_body() {
        let body = SearchRequest::new().build(&mapping()).unwrap();
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert_eq!(body["from"], 0);
        assert_eq!(body["size"], DEFAULT_PAGE_SIZE);
        assert!(body.get("sort").is_none());
        assert!(body.get("aggs").is_none());
    }

    #[test]
    fn test_paging_offset() {
        let body = SearchRequest::new().page(2, 3).build(&mapping()).unwrap();
        assert_eq!(body["from"], 6);
        assert_eq!(body["size"], 3);
    }

    #[test]
    fn test_zero_page_size_is_invalid() {
        let err = SearchRequest::new().page(0, 0).build(&mapping()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));
    }

    #[test]
    fn test_sorts_keep_priority_order() {
        let body = SearchRequest::new()
            .sort("price", SortOrder::Desc)
            .sort("brand", SortOrder::Asc)
            .build(&mapping())
            .unwrap();
        assert_eq!(
            body["sort"],
            json!([{ "price": { "order": "desc" } }, { "brand": { "order": "asc" } }])
        );
    }

    #[test]
    fn test_sort_on_text_is_invalid() {
        let request = SearchRequest::new().sort("title", SortOrder::Asc);
        assert!(request.validate(&mapping()).is_err());
    }

    #[test]
    fn test_source_filter() {
        let request = SearchRequest::new().page(1, 5).without_source();
        assert!(request.is_source_suppressed());
        let body = request.build(&mapping()).unwrap();
        assert_eq!(body["_source"], json!({ "includes": [""] }));
        assert_eq!(body["size"], 0);
        assert_eq!(body["from"], 5);

        let partial = SearchRequest::new().source_filter(vec!["title".into()], vec![]);
        assert!(!partial.is_source_suppressed());
        assert_eq!(partial.build(&mapping()).unwrap()["size"], DEFAULT_PAGE_SIZE);

        let request = SearchRequest::new().source_filter(vec!["nope".into()], vec![]);
        assert!(request.validate(&mapping()).is_err());
    }

    #[test]
    fn test_search_after_starts_at_zero() {
        let body = SearchRequest::new()
            .sort("price", SortOrder::Asc)
            .sort(ID_FIELD, SortOrder::Asc)
            .page(3, 2)
            .search_after(vec![json!(3299.0), json!("5")])
            .build(&mapping())
            .unwrap();
        assert_eq!(body["from"], 0);
        assert_eq!(body["size"], 2);
        assert_eq!(body["search_after"], json!([3299.0, "5"]));
        assert_eq!(body["sort"][1], json!({ "_id": { "order": "asc" } }));
    }

    #[test]
    fn test_search_after_without_sort_is_invalid() {
        let request = SearchRequest::new().search_after(vec![json!(1)]);
        assert!(matches!(request.validate(&mapping()), Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn test_duplicate_top_level_aggregation() {
        let request = SearchRequest::new()
            .aggregation("brands", Aggregation::terms("brand"))
            .aggregation("brands", Aggregation::terms("brand"));
        let err = request.build(&mapping()).unwrap_err();
        assert!(matches!(err, SearchError::InvalidAggregation(_)));
    }

    #[test]
    fn test_builder_returns_new_values() {
        let base = SearchRequest::new().query(Query::matching("title", "phone"));
        let paged = base.clone().page(1, 5);
        assert_eq!(base.page_request(), PageRequest::default());
        assert_eq!(paged.page_request(), PageRequest::of(1, 5));
    }
}
