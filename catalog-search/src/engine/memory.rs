//! In-process engine.
//!
//! Evaluates the subset of the query DSL this crate renders (match_all,
//! match, term, range, bool, sort, paging, `search_after`, `_source`
//! filtering and terms/avg/sum/min/max aggregations) against documents held
//! in memory. Writes are visible immediately, so `refresh` only checks the
//! index exists. `from + size` is capped by the index's `max_result_window`
//! setting, 10 000 unless the index was created with another value.
//!
//! Text fields are tokenized on Unicode word boundaries and lowercased;
//! a match scores one point per distinct query token found in the field.
//! Ties in score, and in any explicit sort, fall back to ascending id.

use super::SearchEngine;
use crate::{
    bulk::{BulkItem, BulkItemError, BulkItemStatus, BulkResponse},
    error::{Result, SearchError},
    index::{FieldType, Mapping},
};
use async_trait::async_trait;
use catalog_log::debug;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use unicode_segmentation::UnicodeSegmentation;

const DEFAULT_SIZE: usize = 10;
const DEFAULT_MAX_RESULT_WINDOW: u64 = 10_000;

#[derive(Debug, Default)]
struct MemoryIndex {
    settings: Value,
    mapping: Mapping,
    docs: BTreeMap<String, Value>,
}

impl MemoryIndex {
    fn with_settings(settings: Value) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }
}

/// [`SearchEngine`] that keeps every index in memory.
///
/// Clones share the same indices.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    indices: Arc<RwLock<HashMap<String, MemoryIndex>>>,
}

impl InMemoryEngine {
    /// Create an engine with no indices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings the index was created with.
    pub fn settings(&self, index: &str) -> Option<Value> {
        self.indices.read().get(index).map(|i| i.settings.clone())
    }

    /// Current field mapping of the index.
    pub fn mapping(&self, index: &str) -> Option<Mapping> {
        self.indices.read().get(index).map(|i| i.mapping.clone())
    }

    /// Number of stored documents, 0 for a missing index.
    pub fn len(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, |i| i.docs.len())
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self, index: &str) -> bool {
        self.len(index) == 0
    }

    fn read<R>(&self, index: &str, f: impl FnOnce(&MemoryIndex) -> Result<R>) -> Result<R> {
        let indices = self.indices.read();
        let idx = indices
            .get(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;
        f(idx)
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn create_index(&self, index: &str, settings: &Value) -> Result<()> {
        if index.is_empty() || index.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(SearchError::Internal(format!(
                "invalid_index_name_exception: [{}] must be lowercase and non-empty",
                index
            )));
        }

        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(SearchError::AlreadyExists(index.to_string()));
        }

        let mut idx = MemoryIndex::with_settings(settings.get("settings").cloned().unwrap_or(json!({})));
        if let Some(mappings) = settings.get("mappings") {
            idx.mapping = Mapping::from_json(mappings);
        }
        indices.insert(index.to_string(), idx);
        debug!("Created in-memory index {}", index);
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.read().contains_key(index))
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        let incoming = Mapping::from_json(mapping);
        let mut indices = self.indices.write();
        let idx = indices
            .get_mut(index)
            .ok_or_else(|| SearchError::IndexNotFound(index.to_string()))?;

        for (name, field) in &incoming.properties {
            if let Some(existing) = idx.mapping.get(name) {
                if existing != field {
                    return Err(SearchError::Internal(format!(
                        "illegal_argument_exception: mapper [{}] cannot be changed from type [{}] to [{}]",
                        name,
                        existing.field_type.as_str(),
                        field.field_type.as_str()
                    )));
                }
            }
        }
        idx.mapping.properties.extend(incoming.properties);
        Ok(())
    }

    async fn index_document(&self, index: &str, id: &str, doc: &Value, _refresh: bool) -> Result<()> {
        let mut indices = self.indices.write();
        let idx = indices
            .entry(index.to_string())
            .or_insert_with(|| MemoryIndex::with_settings(json!({})));

        check_document(&idx.mapping, doc).map_err(SearchError::Internal)?;
        idx.docs.insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        docs: &[(String, Value)],
        _refresh: bool,
    ) -> Result<BulkResponse> {
        let mut indices = self.indices.write();
        let idx = indices
            .entry(index.to_string())
            .or_insert_with(|| MemoryIndex::with_settings(json!({})));

        let mut response = BulkResponse::default();
        for (id, doc) in docs {
            let mut status = BulkItemStatus {
                index: index.to_string(),
                id: id.clone(),
                version: None,
                result: None,
                status: 201,
                error: None,
            };

            match check_document(&idx.mapping, doc) {
                Ok(()) => {
                    let replaced = idx.docs.insert(id.clone(), doc.clone()).is_some();
                    status.result = Some(if replaced { "updated" } else { "created" }.to_string());
                    status.status = if replaced { 200 } else { 201 };
                }
                Err(reason) => {
                    response.errors = true;
                    status.status = 400;
                    status.error = Some(BulkItemError {
                        error_type: "mapper_parsing_exception".to_string(),
                        reason,
                    });
                }
            }
            response.items.push(BulkItem { index: status });
        }
        Ok(response)
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>> {
        self.read(index, |idx| Ok(idx.docs.get(id).cloned()))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        self.read(index, |idx| run_search(idx, body))
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        self.read(index, |idx| {
            let mut n = 0;
            for doc in idx.docs.values() {
                if evaluate(query, doc, &idx.mapping)?.is_some() {
                    n += 1;
                }
            }
            Ok(n)
        })
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.read(index, |_| Ok(()))
    }
}

/// Reject values a strict engine could not index under the mapping.
fn check_document(mapping: &Mapping, doc: &Value) -> std::result::Result<(), String> {
    let object = doc
        .as_object()
        .ok_or_else(|| "document must be a JSON object".to_string())?;

    for (name, value) in object {
        let Some(field) = mapping.get(name) else { continue };
        let ok = flatten(value).iter().all(|v| match field.field_type {
            FieldType::Long => v.is_i64() || v.is_u64(),
            FieldType::Double => v.is_number(),
            FieldType::Text | FieldType::Keyword => !v.is_object(),
        });
        if !ok {
            return Err(format!(
                "failed to parse field [{}] of type [{}]",
                name,
                field.field_type.as_str()
            ));
        }
    }
    Ok(())
}

fn max_result_window(settings: &Value) -> u64 {
    settings
        .get("max_result_window")
        .or_else(|| settings.get("index.max_result_window"))
        .or_else(|| settings.get("index").and_then(|index| index.get("max_result_window")))
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
        .unwrap_or(DEFAULT_MAX_RESULT_WINDOW)
}

struct Hit<'a> {
    id: &'a str,
    doc: &'a Value,
    score: f64,
    /// One value per sort key, as echoed back in the hit's `sort`.
    sort: Vec<Value>,
}

fn run_search(idx: &MemoryIndex, body: &Value) -> Result<Value> {
    let match_all = json!({ "match_all": {} });
    let query = body.get("query").unwrap_or(&match_all);

    let from = body["from"].as_u64().unwrap_or(0) as usize;
    let size = body["size"].as_u64().map_or(DEFAULT_SIZE, |s| s as usize);
    let window = max_result_window(&idx.settings);
    if (from + size) as u64 > window {
        return Err(SearchError::ResultWindowTooLarge(format!(
            "Result window is too large, from + size must be less than or equal to: [{}] but was [{}]",
            window,
            from + size
        )));
    }

    let keys = sort_keys(body.get("sort"))?;
    let after = match body.get("search_after") {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) if values.len() == keys.len() && from == 0 => Some(values),
        Some(_) => {
            return Err(SearchError::Internal(
                "illegal_argument_exception: search_after needs one value per sort key and from = 0"
                    .to_string(),
            ))
        }
    };

    let mut hits: Vec<Hit> = Vec::new();
    for (id, doc) in &idx.docs {
        if let Some(score) = evaluate(query, doc, &idx.mapping)? {
            let sort = keys.iter().map(|key| key.value_of(id, doc, score)).collect();
            hits.push(Hit { id, doc, score, sort });
        }
    }
    hits.sort_by(|a, b| {
        compare_sort_values(&keys, &a.sort, &b.sort).then_with(|| compare_ids(a.id, b.id))
    });

    let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
        Some(aggs) => {
            let docs: Vec<&Value> = hits.iter().map(|hit| hit.doc).collect();
            Some(aggregate_scope(aggs, &docs)?)
        }
        None => None,
    };

    let max_score = hits.iter().map(|h| h.score).fold(None, |acc: Option<f64>, s| {
        Some(acc.map_or(s, |m| m.max(s)))
    });

    let echo_sort = body.get("sort").is_some();
    let page: Vec<Value> = hits
        .iter()
        .filter(|hit| {
            after.is_none_or(|after| compare_sort_values(&keys, &hit.sort, after) == Ordering::Greater)
        })
        .skip(from)
        .take(size)
        .map(|hit| {
            let mut out = json!({ "_id": hit.id, "_score": hit.score });
            if let Some(source) = filter_source(hit.doc, body.get("_source")) {
                out["_source"] = source;
            }
            if echo_sort {
                out["sort"] = Value::Array(hit.sort.clone());
            }
            out
        })
        .collect();

    let mut response = json!({
        "took": 0,
        "timed_out": false,
        "hits": {
            "total": { "value": hits.len(), "relation": "eq" },
            "max_score": max_score,
            "hits": page,
        }
    });
    if let Some(aggregations) = aggregations {
        response["aggregations"] = aggregations;
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn single_entry<'a>(value: &'a Value, what: &str) -> Result<(&'a str, &'a Value)> {
    match value.as_object() {
        Some(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next().ok_or_else(|| malformed(what))?;
            Ok((key.as_str(), inner))
        }
        _ => Err(malformed(what)),
    }
}

fn malformed(what: &str) -> SearchError {
    SearchError::Internal(format!("parsing_exception: malformed {}", what))
}

/// Score of `doc` under `query`, or `None` when it does not match.
fn evaluate(query: &Value, doc: &Value, mapping: &Mapping) -> Result<Option<f64>> {
    let (kind, clause) = single_entry(query, "query")?;
    match kind {
        "match_all" => Ok(Some(1.0)),
        "match" => {
            let (field, params) = single_entry(clause, "match query")?;
            let (text, operator) = match params {
                Value::Object(obj) => (
                    obj.get("query").map(scalar_text).unwrap_or_default(),
                    obj.get("operator").and_then(Value::as_str).unwrap_or("or"),
                ),
                other => (scalar_text(other), "or"),
            };
            Ok(match_field(mapping, doc, field, &text, operator.eq_ignore_ascii_case("and")))
        }
        "term" => {
            let (field, params) = single_entry(clause, "term query")?;
            let target = params.get("value").unwrap_or(params);
            Ok(term_field(mapping, doc, field, target).then_some(1.0))
        }
        "range" => {
            let (field, bounds) = single_entry(clause, "range query")?;
            Ok(range_field(doc, field, bounds).then_some(1.0))
        }
        "bool" => evaluate_bool(clause, doc, mapping),
        other => Err(SearchError::Internal(format!(
            "parsing_exception: unknown query [{}]",
            other
        ))),
    }
}

fn evaluate_bool(clause: &Value, doc: &Value, mapping: &Mapping) -> Result<Option<f64>> {
    let (must, should, must_not, filter) = (
        clauses(clause, "must"),
        clauses(clause, "should"),
        clauses(clause, "must_not"),
        clauses(clause, "filter"),
    );

    let mut score = 0.0;
    for q in &must {
        match evaluate(q, doc, mapping)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }
    for q in &filter {
        if evaluate(q, doc, mapping)?.is_none() {
            return Ok(None);
        }
    }
    for q in &must_not {
        if evaluate(q, doc, mapping)?.is_some() {
            return Ok(None);
        }
    }

    let mut any_should = false;
    for q in &should {
        if let Some(s) = evaluate(q, doc, mapping)? {
            any_should = true;
            score += s;
        }
    }
    if !should.is_empty() && must.is_empty() && filter.is_empty() && !any_should {
        return Ok(None);
    }
    if must.is_empty() && should.is_empty() && filter.is_empty() {
        score = 1.0;
    }
    Ok(Some(score))
}

fn clauses<'a>(entry: &'a Value, name: &str) -> Vec<&'a Value> {
    match entry.get(name) {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn match_field(mapping: &Mapping, doc: &Value, field: &str, text: &str, all: bool) -> Option<f64> {
    let values = flatten(doc.get(field)?);
    match mapping.get(field).map(|f| f.field_type) {
        Some(FieldType::Keyword) => values
            .iter()
            .any(|v| scalar_text(v) == text)
            .then_some(1.0),
        Some(FieldType::Long | FieldType::Double) => {
            let wanted: f64 = text.trim().parse().ok()?;
            values
                .iter()
                .any(|v| v.as_f64() == Some(wanted))
                .then_some(1.0)
        }
        Some(FieldType::Text) | None => {
            let mut wanted = tokenize(text);
            wanted.sort();
            wanted.dedup();
            if wanted.is_empty() {
                return None;
            }
            let present: Vec<String> = values.iter().flat_map(|v| tokenize(&scalar_text(v))).collect();
            let matched = wanted.iter().filter(|t| present.contains(t)).count();
            let hit = if all { matched == wanted.len() } else { matched > 0 };
            hit.then_some(matched as f64)
        }
    }
}

fn term_field(mapping: &Mapping, doc: &Value, field: &str, target: &Value) -> bool {
    let Some(value) = doc.get(field) else { return false };
    let values = flatten(value);
    match mapping.get(field).map(|f| f.field_type) {
        Some(FieldType::Text) | None if target.is_string() => {
            let wanted = scalar_text(target);
            values
                .iter()
                .any(|v| v == &target || tokenize(&scalar_text(v)).contains(&wanted))
        }
        _ => values
            .iter()
            .any(|v| compare_values(v, target) == Some(Ordering::Equal)),
    }
}

fn range_field(doc: &Value, field: &str, bounds: &Value) -> bool {
    let Some(value) = doc.get(field) else { return false };
    flatten(value).iter().any(|v| {
        let check = |key: &str, accept: fn(Ordering) -> bool| match bounds.get(key) {
            None | Some(Value::Null) => true,
            Some(bound) => compare_values(v, bound).is_some_and(accept),
        };
        check("gt", |o| o == Ordering::Greater)
            && check("gte", |o| o != Ordering::Less)
            && check("lt", |o| o == Ordering::Less)
            && check("lte", |o| o != Ordering::Greater)
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Number(x), Value::String(s)) => x.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Value::String(s), Value::Number(y)) => s.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Sorting and source filtering
// ---------------------------------------------------------------------------

enum SortTarget {
    Score,
    Id,
    Field(String),
}

struct SortKey {
    target: SortTarget,
    descending: bool,
}

impl SortKey {
    fn value_of(&self, id: &str, doc: &Value, score: f64) -> Value {
        match &self.target {
            SortTarget::Score => json!(score),
            SortTarget::Id => json!(id),
            SortTarget::Field(field) => doc
                .get(field)
                .and_then(|v| flatten(v).first().copied().cloned())
                .unwrap_or(Value::Null),
        }
    }

    fn compare(&self, x: &Value, y: &Value) -> Ordering {
        let ordering = match (x, y) {
            // missing values sort last in either direction
            (Value::Null, Value::Null) => return Ordering::Equal,
            (_, Value::Null) => return Ordering::Less,
            (Value::Null, _) => return Ordering::Greater,
            (Value::String(a), Value::String(b)) if matches!(self.target, SortTarget::Id) => {
                compare_ids(a, b)
            }
            _ => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        if self.descending { ordering.reverse() } else { ordering }
    }
}

fn sort_keys(sort: Option<&Value>) -> Result<Vec<SortKey>> {
    let entries: Vec<&Value> = match sort {
        None => Vec::new(),
        Some(Value::Array(list)) => list.iter().collect(),
        Some(single) => vec![single],
    };

    let mut keys = Vec::with_capacity(entries.len());
    for entry in entries {
        let (name, descending) = match entry {
            Value::String(name) => (name.as_str(), name == "_score"),
            other => {
                let (name, order) = single_entry(other, "sort")?;
                let order = order
                    .get("order")
                    .and_then(Value::as_str)
                    .or_else(|| order.as_str())
                    .unwrap_or(if name == "_score" { "desc" } else { "asc" });
                (name, order.eq_ignore_ascii_case("desc"))
            }
        };
        let target = match name {
            "_score" => SortTarget::Score,
            "_id" => SortTarget::Id,
            field => SortTarget::Field(field.to_string()),
        };
        keys.push(SortKey { target, descending });
    }

    if keys.is_empty() {
        keys.push(SortKey {
            target: SortTarget::Score,
            descending: true,
        });
    }
    Ok(keys)
}

fn compare_sort_values(keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    keys.iter()
        .zip(a.iter().zip(b))
        .map(|(key, (x, y))| key.compare(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn filter_source(doc: &Value, entry: Option<&Value>) -> Option<Value> {
    let (includes, excludes): (Vec<&str>, Vec<&str>) = match entry {
        None | Some(Value::Bool(true)) => return Some(doc.clone()),
        Some(Value::Bool(false)) => return None,
        Some(Value::String(s)) => (vec![s.as_str()], Vec::new()),
        Some(Value::Array(list)) => (list.iter().filter_map(Value::as_str).collect(), Vec::new()),
        Some(obj) => (names(obj, "includes"), names(obj, "excludes")),
    };

    let fields = doc.as_object()?;
    let kept: Map<String, Value> = fields
        .iter()
        .filter(|(name, _)| includes.is_empty() || includes.iter().any(|p| glob(p, name)))
        .filter(|(name, _)| !excludes.iter().any(|p| glob(p, name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Some(Value::Object(kept))
}

fn names<'a>(entry: &'a Value, key: &str) -> Vec<&'a str> {
    entry.get(key)
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn glob(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => !pattern.is_empty() && pattern == name,
        Some((prefix, rest)) => {
            name.len() >= prefix.len()
                && name.starts_with(prefix)
                && (rest.is_empty()
                    || (0..=name.len() - prefix.len()).any(|i| {
                        name.is_char_boundary(prefix.len() + i) && glob(rest, &name[prefix.len() + i..])
                    }))
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

fn aggregate_scope(aggs: &Value, docs: &[&Value]) -> Result<Value> {
    let entries = aggs.as_object().ok_or_else(|| malformed("aggregations"))?;
    let mut out = Map::new();
    for (name, entry) in entries {
        out.insert(name.clone(), aggregate(name, entry, docs)?);
    }
    Ok(Value::Object(out))
}

fn aggregate(name: &str, entry: &Value, docs: &[&Value]) -> Result<Value> {
    let object = entry.as_object().ok_or_else(|| malformed("aggregation"))?;
    let children = object.get("aggs").or_else(|| object.get("aggregations"));
    let mut kinds = object
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "aggs" | "aggregations" | "meta"));

    let (kind, params) = match (kinds.next(), kinds.next()) {
        (Some(only), None) => only,
        _ => return Err(malformed("aggregation")),
    };
    let kind = kind.as_str();
    let field = params["field"]
        .as_str()
        .ok_or_else(|| SearchError::Internal(format!("[{}] requires a field", name)))?;

    if kind != "terms" && children.is_some() {
        return Err(SearchError::Internal(format!(
            "aggregation_initialization_exception: Aggregator [{}] of type [{}] cannot accept sub-aggregations",
            name, kind
        )));
    }

    let numbers = || -> Vec<f64> {
        docs.iter()
            .filter_map(|d| d.get(field))
            .flat_map(flatten)
            .filter_map(Value::as_f64)
            .collect()
    };

    match kind {
        "terms" => terms(params, field, children, docs),
        "avg" => {
            let values = numbers();
            let avg = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
            Ok(json!({ "value": avg }))
        }
        "sum" => Ok(json!({ "value": numbers().iter().sum::<f64>() })),
        "min" => Ok(json!({ "value": numbers().into_iter().reduce(f64::min) })),
        "max" => Ok(json!({ "value": numbers().into_iter().reduce(f64::max) })),
        other => Err(SearchError::Internal(format!(
            "unknown aggregation type [{}]",
            other
        ))),
    }
}

fn terms(params: &Value, field: &str, children: Option<&Value>, docs: &[&Value]) -> Result<Value> {
    let size = params["size"].as_u64().map_or(DEFAULT_SIZE, |s| s as usize);

    let mut groups: Vec<(Value, Vec<&Value>)> = Vec::new();
    for doc in docs {
        let Some(value) = doc.get(field) else { continue };
        let mut seen: Vec<&Value> = Vec::new();
        for key in flatten(value) {
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            match groups.iter_mut().find(|(k, _)| k == key) {
                Some((_, members)) => members.push(*doc),
                None => groups.push((key.clone(), vec![*doc])),
            }
        }
    }

    groups.sort_by(|(ka, da), (kb, db)| {
        db.len()
            .cmp(&da.len())
            .then_with(|| compare_values(ka, kb).unwrap_or(Ordering::Equal))
    });

    let other: usize = groups.iter().skip(size).map(|(_, members)| members.len()).sum();
    let mut buckets = Vec::with_capacity(groups.len().min(size));
    for (key, members) in groups.into_iter().take(size) {
        let mut bucket = json!({ "key": key, "doc_count": members.len() });
        if let Some(children) = children {
            if let (Value::Object(target), Value::Object(sub)) =
                (&mut bucket, aggregate_scope(children, &members)?)
            {
                target.extend(sub);
            }
        }
        buckets.push(bucket);
    }

    Ok(json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": other,
        "buckets": buckets,
    }))
}
