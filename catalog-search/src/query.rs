//! Query DSL.

use crate::{
    error::{Result, SearchError},
    index::{Mapping, MappingField},
};
use serde_json::{json, Value};

/// A search query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Match all documents.
    MatchAll,
    /// Analyzed full-text match.
    Match(MatchQuery),
    /// Exact value.
    Term(TermQuery),
    /// Numeric bounds.
    Range(RangeQuery),
    /// Combination of sub-queries.
    Bool(BoolQuery),
}

impl Query {
    /// Full-text query on an analyzed field.
    pub fn matching(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Match(MatchQuery::new(field, text))
    }

    /// Exact-value query on a non-analyzed field.
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Term(TermQuery::new(field, value))
    }

    /// Start a range query; convert with `.into()` once bounds are set.
    pub fn range(field: impl Into<String>) -> RangeQuery {
        RangeQuery::new(field)
    }

    /// Inclusive range `lower <= field <= upper`.
    pub fn between(field: impl Into<String>, lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Query::Range(RangeQuery::new(field).gte(lower).lte(upper))
    }

    /// Start a bool query.
    pub fn bool() -> BoolQueryBuilder {
        BoolQueryBuilder::new()
    }

    /// Query DSL body, as sent under `"query"`.
    pub fn to_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Match(m) => m.to_json(),
            Query::Term(t) => t.to_json(),
            Query::Range(r) => r.to_json(),
            Query::Bool(b) => b.to_json(),
        }
    }

    /// Check every field this query touches against `mapping`.
    pub fn validate(&self, mapping: &Mapping) -> Result<()> {
        match self {
            Query::MatchAll => Ok(()),
            Query::Match(m) => {
                require(mapping, &m.field, "match", MappingField::supports_match)
            }
            Query::Term(t) => require(mapping, &t.field, "term", MappingField::supports_term),
            Query::Range(r) => {
                require(mapping, &r.field, "range", MappingField::supports_range)?;
                if r.is_unbounded() {
                    return Err(SearchError::InvalidQuery(format!(
                        "range query on '{}' has no bounds",
                        r.field
                    )));
                }
                Ok(())
            }
            Query::Bool(b) => b
                .must
                .iter()
                .chain(&b.should)
                .chain(&b.must_not)
                .chain(&b.filter)
                .try_for_each(|q| q.validate(mapping)),
        }
    }
}

impl From<MatchQuery> for Query {
    fn from(query: MatchQuery) -> Self {
        Query::Match(query)
    }
}

impl From<TermQuery> for Query {
    fn from(query: TermQuery) -> Self {
        Query::Term(query)
    }
}

impl From<RangeQuery> for Query {
    fn from(query: RangeQuery) -> Self {
        Query::Range(query)
    }
}

fn require(
    mapping: &Mapping,
    field: &str,
    operation: &str,
    allowed: fn(&MappingField) -> bool,
) -> Result<()> {
    let definition = mapping
        .get(field)
        .ok_or_else(|| SearchError::InvalidQuery(format!("unknown field '{}'", field)))?;

    if !allowed(definition) {
        return Err(SearchError::InvalidQuery(format!(
            "{} query not supported on {} field '{}'{}",
            operation,
            definition.field_type.as_str(),
            field,
            if definition.is_indexed() { "" } else { " (not indexed)" }
        )));
    }
    Ok(())
}

/// Analyzed full-text query. Documents score by how many query tokens they share.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    /// Analyzed field.
    pub field: String,
    /// Text to analyze and look up.
    pub query: String,
    /// `and` or `or`; the engine defaults to `or`.
    pub operator: Option<String>,
}

impl MatchQuery {
    /// Match `text` against `field`.
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            query: text.into(),
            operator: None,
        }
    }

    /// Require every token (`"and"`) or any token (`"or"`).
    pub fn operator(self, operator: impl Into<String>) -> Self {
        Self { operator: Some(operator.into()), ..self }
    }

    fn to_json(&self) -> Value {
        let body = match &self.operator {
            Some(operator) => json!({ "query": self.query, "operator": operator }),
            None => json!({ "query": self.query }),
        };
        json!({ "match": { &self.field: body } })
    }
}

/// Exact-value query on a keyword or numeric field.
#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    /// Field name.
    pub field: String,
    /// Exact value to match.
    pub value: Value,
}

impl TermQuery {
    /// Match documents whose `field` equals `value`.
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn to_json(&self) -> Value {
        json!({ "term": { &self.field: self.value } })
    }
}

/// Bounded range over a numeric field. Any subset of the four bounds may be set.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    /// Field name.
    pub field: String,
    /// Exclusive lower bound.
    pub gt: Option<Value>,
    /// Inclusive lower bound.
    pub gte: Option<Value>,
    /// Exclusive upper bound.
    pub lt: Option<Value>,
    /// Inclusive upper bound.
    pub lte: Option<Value>,
}

impl RangeQuery {
    /// Unbounded range on `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }

    /// `field > bound`
    pub fn gt(self, bound: impl Into<Value>) -> Self {
        Self { gt: Some(bound.into()), ..self }
    }

    /// `field >= bound`
    pub fn gte(self, bound: impl Into<Value>) -> Self {
        Self { gte: Some(bound.into()), ..self }
    }

    /// `field < bound`
    pub fn lt(self, bound: impl Into<Value>) -> Self {
        Self { lt: Some(bound.into()), ..self }
    }

    /// `field <= bound`
    pub fn lte(self, bound: impl Into<Value>) -> Self {
        Self { lte: Some(bound.into()), ..self }
    }

    fn is_unbounded(&self) -> bool {
        self.bounds().next().is_none()
    }

    fn bounds(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        [("gt", &self.gt), ("gte", &self.gte), ("lt", &self.lt), ("lte", &self.lte)]
            .into_iter()
            .filter_map(|(op, bound)| bound.as_ref().map(|v| (op, v)))
    }

    fn to_json(&self) -> Value {
        let bounds: serde_json::Map<String, Value> = self
            .bounds()
            .map(|(op, v)| (op.to_string(), v.clone()))
            .collect();
        json!({ "range": { &self.field: bounds } })
    }
}

/// Bool query for combining multiple queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    /// Must match (AND).
    pub must: Vec<Query>,
    /// Should match (OR).
    pub should: Vec<Query>,
    /// Must not match (NOT).
    pub must_not: Vec<Query>,
    /// Filter (non-scoring).
    pub filter: Vec<Query>,
}

impl BoolQuery {
    fn to_json(&self) -> Value {
        let mut bool_query = serde_json::Map::new();

        for (clause, queries) in [
            ("must", &self.must),
            ("should", &self.should),
            ("must_not", &self.must_not),
            ("filter", &self.filter),
        ] {
            if !queries.is_empty() {
                bool_query.insert(
                    clause.to_string(),
                    Value::Array(queries.iter().map(Query::to_json).collect()),
                );
            }
        }

        json!({ "bool": bool_query })
    }
}

/// Builder for bool queries.
#[derive(Debug, Clone, Default)]
pub struct BoolQueryBuilder {
    query: BoolQuery,
}

impl BoolQueryBuilder {
    /// Create a new bool query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a must clause.
    pub fn must(mut self, query: Query) -> Self {
        self.query.must.push(query);
        self
    }

    /// Add a should clause.
    pub fn should(mut self, query: Query) -> Self {
        self.query.should.push(query);
        self
    }

    /// Add a must_not clause.
    pub fn must_not(mut self, query: Query) -> Self {
        self.query.must_not.push(query);
        self
    }

    /// Add a filter clause.
    pub fn filter(mut self, query: Query) -> Self {
        self.query.filter.push(query);
        self
    }

    /// Build the query.
    pub fn build(self) -> Query {
        Query::Bool(self.query)
    }
}
