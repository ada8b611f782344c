//! The `Item` record.

use catalog_search::{Document, IndexSettings, Mapping, MappingField, Result, SearchError};
use serde::{Deserialize, Serialize};

/// Name of the index holding items.
pub const ITEM_INDEX: &str = "item";

/// A product for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique key, also the engine document id.
    pub id: u64,
    /// Word-segmented full-text title.
    pub title: String,
    /// Exact-match category.
    pub category: String,
    /// Exact-match brand, used for grouping.
    pub brand: String,
    /// Price; finite and non-negative.
    pub price: f64,
    /// Image URL. Stored, never searchable.
    pub images: String,
}

impl Item {
    /// Create an item.
    pub fn new(
        id: u64,
        title: impl Into<String>,
        category: impl Into<String>,
        brand: impl Into<String>,
        price: f64,
        images: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            category: category.into(),
            brand: brand.into(),
            price,
            images: images.into(),
        }
    }
}

impl Document for Item {
    fn index_name() -> &'static str {
        ITEM_INDEX
    }

    fn index_settings() -> IndexSettings {
        IndexSettings::new().shards(3).replicas(2)
    }

    fn mapping() -> Mapping {
        Mapping::new()
            .field("id", MappingField::long())
            .field("title", MappingField::text().analyzer("ik_max_word"))
            .field("category", MappingField::keyword())
            .field("brand", MappingField::keyword())
            .field("price", MappingField::double())
            .field("images", MappingField::keyword().not_indexed())
    }

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn id_field() -> Option<&'static str> {
        Some("id")
    }

    fn validate(&self) -> Result<()> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(SearchError::Validation(format!(
                "item {}: price must be a non-negative number, got {}",
                self.id, self.price
            )));
        }
        Ok(())
    }
}
