//! Index settings and field mappings.
//!
//! A [`Mapping`] is both the body sent to the engine when the index schema is
//! created and the table the query and aggregation builders validate field
//! usage against.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Settings applied when an index is created. Unset values fall back to
/// the engine's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Primary shard count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_shards: Option<i32>,
    /// Replicas per primary shard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_replicas: Option<i32>,
    /// How often new writes become searchable, e.g. `"1s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    /// Upper bound on `from + size` for a single search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_result_window: Option<u64>,
}

impl IndexSettings {
    /// Engine defaults for everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary shard count.
    pub fn shards(self, shards: i32) -> Self {
        Self { number_of_shards: Some(shards), ..self }
    }

    /// Replica count.
    pub fn replicas(self, replicas: i32) -> Self {
        Self { number_of_replicas: Some(replicas), ..self }
    }

    /// Refresh interval.
    pub fn refresh_interval(self, interval: impl Into<String>) -> Self {
        Self { refresh_interval: Some(interval.into()), ..self }
    }

    /// Largest `from + size` a search may ask for (engine default 10 000).
    pub fn max_result_window(self, window: u64) -> Self {
        Self { max_result_window: Some(window), ..self }
    }

    /// Body for the create-index call; `{}` when nothing is set.
    pub fn to_json(&self) -> Value {
        if *self == Self::default() {
            return json!({});
        }
        json!({ "settings": serde_json::to_value(self).unwrap_or_default() })
    }
}

/// Field definitions of an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    /// Field definitions, keyed by field name.
    pub properties: BTreeMap<String, MappingField>,
}

impl Mapping {
    /// Create a new mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, field: MappingField) -> Self {
        self.properties.insert(name.into(), field);
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&MappingField> {
        self.properties.get(name)
    }

    /// Body for the put-mapping call.
    pub fn to_json(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json()))
            .collect();

        json!({ "properties": properties })
    }

    /// Parse a mapping body produced by [`Mapping::to_json`] or returned by
    /// the engine. Fields of types this crate does not model are skipped.
    pub fn from_json(value: &Value) -> Self {
        let mut mapping = Mapping::new();
        if let Some(properties) = value["properties"].as_object() {
            for (name, field) in properties {
                if let Some(field) = MappingField::from_json(field) {
                    mapping.properties.insert(name.clone(), field);
                }
            }
        }
        mapping
    }
}

/// One field of a [`Mapping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingField {
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Analyzer, meaningful on text fields only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    /// Whether the field is indexed; `Some(false)` means stored only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
}

impl MappingField {
    fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            analyzer: None,
            index: None,
        }
    }

    /// Analyzed full-text field.
    pub fn text() -> Self {
        Self::of(FieldType::Text)
    }

    /// Exact-match keyword field.
    pub fn keyword() -> Self {
        Self::of(FieldType::Keyword)
    }

    /// 64-bit integer field.
    pub fn long() -> Self {
        Self::of(FieldType::Long)
    }

    /// Double precision field.
    pub fn double() -> Self {
        Self::of(FieldType::Double)
    }

    /// Analyze the field with `analyzer` instead of the index default.
    pub fn analyzer(self, analyzer: impl Into<String>) -> Self {
        Self { analyzer: Some(analyzer.into()), ..self }
    }

    /// Store the field without indexing it.
    pub fn not_indexed(self) -> Self {
        Self { index: Some(false), ..self }
    }

    /// Whether the field can be queried at all.
    pub fn is_indexed(&self) -> bool {
        self.index.unwrap_or(true)
    }

    /// Full-text `match` queries.
    pub fn supports_match(&self) -> bool {
        self.is_indexed() && matches!(self.field_type, FieldType::Text | FieldType::Keyword)
    }

    /// Exact `term` queries.
    pub fn supports_term(&self) -> bool {
        self.is_indexed() && self.field_type != FieldType::Text
    }

    /// `range` queries.
    pub fn supports_range(&self) -> bool {
        self.is_indexed() && self.field_type.is_numeric()
    }

    /// Sorting and terms aggregations.
    pub fn is_aggregatable(&self) -> bool {
        self.is_indexed() && self.field_type != FieldType::Text
    }

    /// Numeric metric aggregations (avg, sum, min, max).
    pub fn supports_metrics(&self) -> bool {
        self.is_indexed() && self.field_type.is_numeric()
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "type": self.field_type.as_str() }))
    }

    fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Field types the query builders know how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Analyzed full-text field.
    Text,
    /// Exact-match keyword field.
    Keyword,
    /// 64-bit integer.
    Long,
    /// Double precision float.
    Double,
}

impl FieldType {
    /// Engine name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Keyword => "keyword",
            Self::Long => "long",
            Self::Double => "double",
        }
    }

    /// Long and Double.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Mapping {
        Mapping::new()
            .field("title", MappingField::text().analyzer("standard"))
            .field("brand", MappingField::keyword())
            .field("price", MappingField::double())
            .field("images", MappingField::keyword().not_indexed())
    }

    #[test]
    fn test_settings_json() {
        let body = IndexSettings::new().shards(3).replicas(2).to_json();
        assert_eq!(
            body,
            json!({ "settings": { "number_of_shards": 3, "number_of_replicas": 2 } })
        );
        assert_eq!(IndexSettings::new().to_json(), json!({}));
        assert_eq!(
            IndexSettings::new().max_result_window(50).to_json(),
            json!({ "settings": { "max_result_window": 50 } })
        );
    }

    #[test]
    fn test_mapping_json() {
        let body = sample().to_json();
        assert_eq!(body["properties"]["title"], json!({ "type": "text", "analyzer": "standard" }));
        assert_eq!(body["properties"]["images"], json!({ "type": "keyword", "index": false }));
        assert_eq!(body["properties"]["price"], json!({ "type": "double" }));
    }

    #[test]
    fn test_unknown_field_types_are_skipped() {
        let body = json!({ "properties": {
            "brand": { "type": "keyword" },
            "location": { "type": "geo_point" }
        } });
        let mapping = Mapping::from_json(&body);
        assert!(mapping.get("brand").is_some());
        assert!(mapping.get("location").is_none());
    }

    #[test]
    fn test_mapping_json_parses_back() {
        let mapping = sample();
        assert_eq!(Mapping::from_json(&mapping.to_json()), mapping);
    }

    #[test]
    fn test_queryability_rules() {
        let mapping = sample();
        let title = mapping.get("title").unwrap();
        let brand = mapping.get("brand").unwrap();
        let price = mapping.get("price").unwrap();
        let images = mapping.get("images").unwrap();

        assert!(title.supports_match() && !title.supports_term() && !title.is_aggregatable());
        assert!(brand.supports_term() && brand.is_aggregatable() && !brand.supports_range());
        assert!(price.supports_range() && price.supports_metrics() && price.is_aggregatable());
        assert!(!images.supports_match() && !images.supports_term() && !images.is_aggregatable());
    }
}
