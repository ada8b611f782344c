//! Decoding of raw search responses into typed results.

use crate::error::{Result, SearchError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// One page of decoded documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Documents on this page.
    pub items: Vec<T>,
    /// Documents matching the query across all pages.
    pub total_elements: u64,
    /// Number of pages of `page_size` needed for `total_elements`.
    pub total_pages: u64,
    /// Requested page size.
    pub page_size: usize,
    /// Zero-based page index.
    pub page_number: usize,
    /// Aggregation results, empty when none were requested.
    pub aggregations: Aggregations,
}

impl<T> Page<T> {
    /// Whether this page holds no documents.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a later page exists.
    pub fn has_next(&self) -> bool {
        (self.page_number as u64 + 1) < self.total_pages
    }

    /// Look up a top-level aggregation.
    pub fn aggregation(&self, name: &str) -> Result<&AggregationResult> {
        self.aggregations.get(name)
    }
}

/// Named aggregation results at one level of nesting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregations(BTreeMap<String, AggregationResult>);

impl Aggregations {
    /// Look up a result by name.
    pub fn get(&self, name: &str) -> Result<&AggregationResult> {
        self.0
            .get(name)
            .ok_or_else(|| SearchError::AggregationNotFound(name.to_string()))
    }

    /// Buckets of the named terms aggregation.
    pub fn buckets(&self, name: &str) -> Result<&[Bucket]> {
        self.get(name)?.buckets()
    }

    /// Value of the named metric aggregation.
    pub fn metric(&self, name: &str) -> Result<Option<f64>> {
        self.get(name)?.value()
    }

    /// The named terms aggregation, including its `sum_other_doc_count`.
    pub fn terms(&self, name: &str) -> Result<&TermsResult> {
        self.get(name)?.terms()
    }

    /// Names present at this level.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of results at this level.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no aggregations are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A decoded aggregation result.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationResult {
    /// Buckets from a terms aggregation.
    Terms(TermsResult),
    /// Single value from a metric aggregation.
    Metric(MetricResult),
}

impl AggregationResult {
    /// The bucket with `key`, if this is a terms result that has one.
    pub fn bucket(&self, key: &str) -> Option<&Bucket> {
        match self {
            AggregationResult::Terms(terms) => terms.buckets.iter().find(|b| b.key == key),
            AggregationResult::Metric(_) => None,
        }
    }

    /// Buckets, if this is a terms result.
    pub fn buckets(&self) -> Result<&[Bucket]> {
        Ok(&self.terms()?.buckets)
    }

    /// The whole terms result.
    pub fn terms(&self) -> Result<&TermsResult> {
        match self {
            AggregationResult::Terms(terms) => Ok(terms),
            AggregationResult::Metric(_) => Err(SearchError::Decode(
                "metric aggregation has no buckets".to_string(),
            )),
        }
    }

    /// Value, if this is a metric result.
    pub fn value(&self) -> Result<Option<f64>> {
        match self {
            AggregationResult::Metric(metric) => Ok(metric.value),
            AggregationResult::Terms(_) => Err(SearchError::Decode(
                "terms aggregation has no single value".to_string(),
            )),
        }
    }
}

/// Buckets of a terms aggregation, in engine order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermsResult {
    /// Buckets.
    pub buckets: Vec<Bucket>,
    /// Documents that fell outside the returned buckets.
    pub sum_other_doc_count: u64,
}

impl TermsResult {
    /// Whether every matching document landed in a returned bucket.
    pub fn is_complete(&self) -> bool {
        self.sum_other_doc_count == 0
    }
}

/// A metric value. `None` when the scope held no values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricResult {
    /// The computed value.
    pub value: Option<f64>,
}

/// A group of documents sharing one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// The shared value, as a string.
    pub key: String,
    /// Documents in the bucket.
    pub doc_count: u64,
    /// Results of sub-aggregations for this bucket.
    pub sub_aggregations: Aggregations,
}

impl Bucket {
    /// Sub-aggregation result by name.
    pub fn get(&self, name: &str) -> Result<&AggregationResult> {
        self.sub_aggregations.get(name)
    }

    /// Value of a metric sub-aggregation.
    pub fn metric(&self, name: &str) -> Result<Option<f64>> {
        self.sub_aggregations.metric(name)
    }
}

/// Decode the `_source` of every hit into `T`.
pub fn decode_hits<T: DeserializeOwned>(response: &Value) -> Result<Vec<T>> {
    let Some(hits) = response["hits"]["hits"].as_array() else {
        return Ok(Vec::new());
    };

    hits.iter()
        .map(|hit| {
            let source = hit.get("_source").ok_or_else(|| {
                SearchError::Decode(format!("hit {} has no _source", hit["_id"]))
            })?;
            serde_json::from_value(source.clone())
                .map_err(|e| SearchError::Decode(format!("hit {}: {}", hit["_id"], e)))
        })
        .collect()
}

/// Total hit count. Accepts both `"total": 5` and `"total": { "value": 5 }`.
pub fn decode_total(response: &Value) -> u64 {
    let total = &response["hits"]["total"];
    total
        .as_u64()
        .or_else(|| total["value"].as_u64())
        .unwrap_or(0)
}

/// Decode hits, paging metadata and aggregations.
pub fn decode_page<T: DeserializeOwned>(
    response: &Value,
    page_number: usize,
    page_size: usize,
) -> Result<Page<T>> {
    let items = decode_hits(response)?;
    let total_elements = decode_total(response);
    let total_pages = if page_size == 0 {
        0
    } else {
        total_elements.div_ceil(page_size as u64)
    };

    Ok(Page {
        items,
        total_elements,
        total_pages,
        page_size,
        page_number,
        aggregations: decode_aggregations(response)?,
    })
}

/// Decode every top-level aggregation. Absent `aggregations` decodes empty.
pub fn decode_aggregations(response: &Value) -> Result<Aggregations> {
    match response.get("aggregations") {
        None | Some(Value::Null) => Ok(Aggregations::default()),
        Some(Value::Object(map)) => decode_scope(map.iter()),
        Some(other) => Err(SearchError::Decode(format!(
            "aggregations is not an object: {}",
            other
        ))),
    }
}

/// Buckets of the named top-level terms aggregation.
pub fn decode_buckets(response: &Value, name: &str) -> Result<Vec<Bucket>> {
    let aggregations = decode_aggregations(response)?;
    Ok(aggregations.buckets(name)?.to_vec())
}

fn decode_scope<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Result<Aggregations> {
    let mut results = BTreeMap::new();
    for (name, body) in entries {
        results.insert(name.clone(), decode_result(name, body)?);
    }
    Ok(Aggregations(results))
}

// Terms results carry `buckets`; metric results carry `value`.
fn decode_result(name: &str, body: &Value) -> Result<AggregationResult> {
    if let Some(buckets) = body.get("buckets") {
        let buckets = buckets.as_array().ok_or_else(|| {
            SearchError::Decode(format!("'{}': buckets is not an array", name))
        })?;
        return Ok(AggregationResult::Terms(TermsResult {
            buckets: buckets
                .iter()
                .map(|b| decode_bucket(name, b))
                .collect::<Result<_>>()?,
            sum_other_doc_count: body["sum_other_doc_count"].as_u64().unwrap_or(0),
        }));
    }

    match body.get("value") {
        Some(Value::Null) => Ok(AggregationResult::Metric(MetricResult { value: None })),
        Some(v) => v
            .as_f64()
            .map(|value| AggregationResult::Metric(MetricResult { value: Some(value) }))
            .ok_or_else(|| SearchError::Decode(format!("'{}': value is not a number", name))),
        None => Err(SearchError::Decode(format!(
            "'{}': unrecognized aggregation result",
            name
        ))),
    }
}

fn decode_bucket(parent: &str, bucket: &Value) -> Result<Bucket> {
    let Some(fields) = bucket.as_object() else {
        return Err(SearchError::Decode(format!("'{}': bucket is not an object", parent)));
    };

    let key = match bucket.get("key_as_string").or_else(|| bucket.get("key")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => return Err(SearchError::Decode(format!("'{}': bucket without key", parent))),
    };
    let doc_count = bucket["doc_count"]
        .as_u64()
        .ok_or_else(|| SearchError::Decode(format!("'{}': bucket without doc_count", parent)))?;

    let nested = fields
        .iter()
        .filter(|(k, v)| v.is_object() && !matches!(k.as_str(), "key" | "key_as_string" | "doc_count"));

    Ok(Bucket {
        key,
        doc_count,
        sub_aggregations: decode_scope(nested)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Phone {
        title: String,
        price: f64,
    }

    fn response() -> Value {
        json!({
            "took": 3,
            "hits": {
                "total": { "value": 5, "relation": "eq" },
                "hits": [
                    { "_id": "1", "_source": { "title": "Mi 7", "price": 3299.0 } },
                    { "_id": "2", "_source": { "title": "R1", "price": 3699.0 } }
                ]
            },
            "aggregations": {
                "brands": {
                    "sum_other_doc_count": 0,
                    "buckets": [
                        { "key": "X", "doc_count": 2, "priceAvg": { "value": 15.0 } },
                        { "key": "Y", "doc_count": 1, "priceAvg": { "value": 5.0 } }
                    ]
                },
                "maxPrice": { "value": 20.0 }
            }
        })
    }

    #[test]
    fn test_decode_hits() {
        let phones: Vec<Phone> = decode_hits(&response()).unwrap();
        assert_eq!(phones.len(), 2);
        assert_eq!(phones[0], Phone { title: "Mi 7".into(), price: 3299.0 });
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let response = json!({ "hits": { "hits": [ { "_id": "9", "_source": { "title": "x" } } ] } });
        let err = decode_hits::<Phone>(&response).unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn test_mistyped_field_is_decode_error() {
        let response = json!({
            "hits": { "hits": [ { "_id": "9", "_source": { "title": "x", "price": "cheap" } } ] }
        });
        assert!(matches!(decode_hits::<Phone>(&response), Err(SearchError::Decode(_))));
    }

    #[test]
    fn test_empty_response_is_empty() {
        let response = json!({ "hits": { "total": { "value": 0 }, "hits": [] } });
        let page: Page<Phone> = decode_page(&response, 0, 10).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_elements, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.aggregations.is_empty());
    }

    #[test]
    fn test_page_metadata() {
        let page: Page<Phone> = decode_page(&response(), 0, 3).unwrap();
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page_size, 3);
        assert_eq!(page.page_number, 0);
        assert!(page.has_next());
    }

    #[test]
    fn test_legacy_numeric_total() {
        let response = json!({ "hits": { "total": 7, "hits": [] } });
        assert_eq!(decode_total(&response), 7);
    }

    #[test]
    fn test_decode_buckets_with_sub_aggregation() {
        let buckets = decode_buckets(&response(), "brands").unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, "X");
        assert_eq!(buckets[0].doc_count, 2);
        assert_eq!(buckets[0].metric("priceAvg").unwrap(), Some(15.0));
        assert_eq!(buckets[1].metric("priceAvg").unwrap(), Some(5.0));
    }

    #[test]
    fn test_missing_aggregation_name() {
        let err = decode_buckets(&response(), "categories").unwrap_err();
        assert!(matches!(err, SearchError::AggregationNotFound(name) if name == "categories"));

        let aggs = decode_aggregations(&response()).unwrap();
        let x = aggs.get("brands").unwrap().bucket("X").unwrap();
        assert!(matches!(x.get("nope"), Err(SearchError::AggregationNotFound(_))));
        assert!(aggs.get("brands").unwrap().bucket("Z").is_none());
    }

    #[test]
    fn test_metric_and_null_value() {
        let aggs = decode_aggregations(&response()).unwrap();
        assert_eq!(aggs.metric("maxPrice").unwrap(), Some(20.0));
        assert!(aggs.buckets("maxPrice").is_err());

        let empty = json!({ "aggregations": { "avg": { "value": null } } });
        assert_eq!(decode_aggregations(&empty).unwrap().metric("avg").unwrap(), None);
    }

    #[test]
    fn test_truncated_terms_are_flagged() {
        let aggs = decode_aggregations(&response()).unwrap();
        assert!(aggs.terms("brands").unwrap().is_complete());

        let truncated = json!({ "aggregations": { "brands": {
            "sum_other_doc_count": 4,
            "buckets": [ { "key": "X", "doc_count": 2 } ]
        } } });
        let terms = decode_aggregations(&truncated).unwrap();
        let brands = terms.terms("brands").unwrap();
        assert!(!brands.is_complete());
        assert_eq!(brands.sum_other_doc_count, 4);
    }

    #[test]
    fn test_numeric_bucket_keys() {
        let response = json!({
            "aggregations": {
                "ids": { "buckets": [ { "key": 42, "doc_count": 1 } ] }
            }
        });
        let buckets = decode_buckets(&response, "ids").unwrap();
        assert_eq!(buckets[0].key, "42");
        assert!(buckets[0].sub_aggregations.is_empty());
    }
}
