//! Aggregation builder.

use crate::{
    error::{Result, SearchError},
    index::{Mapping, MappingField},
};
use serde_json::{json, Value};
use std::collections::HashSet;

/// What an aggregation computes.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationKind {
    /// One bucket per distinct value of `field`, ordered by document count
    /// descending, ties by key ascending.
    Terms {
        /// Field to group on.
        field: String,
        /// Maximum number of buckets (engine default 10).
        size: Option<usize>,
    },
    /// Arithmetic mean.
    Avg {
        /// Field to average.
        field: String,
    },
    /// Sum.
    Sum {
        /// Field to sum.
        field: String,
    },
    /// Minimum.
    Min {
        /// Field to find minimum.
        field: String,
    },
    /// Maximum.
    Max {
        /// Field to find maximum.
        field: String,
    },
}

impl AggregationKind {
    fn name(&self) -> &'static str {
        match self {
            AggregationKind::Terms { .. } => "terms",
            AggregationKind::Avg { .. } => "avg",
            AggregationKind::Sum { .. } => "sum",
            AggregationKind::Min { .. } => "min",
            AggregationKind::Max { .. } => "max",
        }
    }

    fn field(&self) -> &str {
        match self {
            AggregationKind::Terms { field, .. }
            | AggregationKind::Avg { field }
            | AggregationKind::Sum { field }
            | AggregationKind::Min { field }
            | AggregationKind::Max { field } => field,
        }
    }
}

/// An aggregation and the aggregations nested inside each of its buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// What this aggregation computes.
    pub kind: AggregationKind,
    /// Named children, evaluated per bucket.
    pub sub_aggregations: Vec<(String, Aggregation)>,
}

impl Aggregation {
    fn of(kind: AggregationKind) -> Self {
        Self {
            kind,
            sub_aggregations: Vec::new(),
        }
    }

    /// Create a terms aggregation.
    pub fn terms(field: impl Into<String>) -> Self {
        Self::of(AggregationKind::Terms {
            field: field.into(),
            size: None,
        })
    }

    /// Create an average aggregation.
    pub fn avg(field: impl Into<String>) -> Self {
        Self::of(AggregationKind::Avg { field: field.into() })
    }

    /// Create a sum aggregation.
    pub fn sum(field: impl Into<String>) -> Self {
        Self::of(AggregationKind::Sum { field: field.into() })
    }

    /// Create a min aggregation.
    pub fn min(field: impl Into<String>) -> Self {
        Self::of(AggregationKind::Min { field: field.into() })
    }

    /// Create a max aggregation.
    pub fn max(field: impl Into<String>) -> Self {
        Self::of(AggregationKind::Max { field: field.into() })
    }

    /// Limit the number of buckets. No effect on metric aggregations.
    pub fn size(mut self, n: usize) -> Self {
        if let AggregationKind::Terms { size, .. } = &mut self.kind {
            *size = Some(n);
        }
        self
    }

    /// Nest `child` under this aggregation, computed once per bucket.
    pub fn sub_aggregation(mut self, name: impl Into<String>, child: Aggregation) -> Self {
        self.sub_aggregations.push((name.into(), child));
        self
    }

    /// Field this aggregation reads.
    pub fn field(&self) -> &str {
        self.kind.field()
    }

    /// Check field usage and name uniqueness, recursively.
    pub fn validate(&self, name: &str, mapping: &Mapping) -> Result<()> {
        let kind = self.kind.name();
        match &self.kind {
            AggregationKind::Terms { field, .. } => {
                require(mapping, name, field, kind, MappingField::is_aggregatable)?;
                validate_scope(&self.sub_aggregations, mapping)
            }
            metric => {
                if !self.sub_aggregations.is_empty() {
                    return Err(SearchError::InvalidAggregation(format!(
                        "'{}': {} aggregation cannot hold sub-aggregations",
                        name, kind
                    )));
                }
                require(mapping, name, metric.field(), kind, MappingField::supports_metrics)
            }
        }
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> Value {
        let mut body = match &self.kind {
            AggregationKind::Terms { field, size } => {
                let mut terms = json!({
                    "field": field,
                    "order": [ { "_count": "desc" }, { "_key": "asc" } ],
                });
                if let Some(s) = size {
                    terms["size"] = json!(s);
                }
                json!({ "terms": terms })
            }
            metric => json!({ metric.name(): { "field": metric.field() } }),
        };

        if !self.sub_aggregations.is_empty() {
            body["aggs"] = scope_to_json(&self.sub_aggregations);
        }
        body
    }
}

/// Validate a list of sibling aggregations: names unique, each valid.
pub(crate) fn validate_scope(scope: &[(String, Aggregation)], mapping: &Mapping) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, agg) in scope {
        if name.is_empty() {
            return Err(SearchError::InvalidAggregation(
                "aggregation name must not be empty".to_string(),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(SearchError::InvalidAggregation(format!(
                "duplicate aggregation name '{}'",
                name
            )));
        }
        agg.validate(name, mapping)?;
    }
    Ok(())
}

/// `{ name: body, ... }` for a list of sibling aggregations.
pub(crate) fn scope_to_json(scope: &[(String, Aggregation)]) -> Value {
    let map: serde_json::Map<String, Value> = scope
        .iter()
        .map(|(name, agg)| (name.clone(), agg.to_json()))
        .collect();
    Value::Object(map)
}

fn require(
    mapping: &Mapping,
    name: &str,
    field: &str,
    kind: &str,
    allowed: fn(&MappingField) -> bool,
) -> Result<()> {
    let definition = mapping.get(field).ok_or_else(|| {
        SearchError::InvalidAggregation(format!("'{}': unknown field '{}'", name, field))
    })?;

    if !allowed(definition) {
        return Err(SearchError::InvalidAggregation(format!(
            "'{}': {} aggregation not supported on {} field '{}'",
            name,
            kind,
            definition.field_type.as_str(),
            field
        )));
    }
    Ok(())
}
