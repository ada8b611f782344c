//! Document trait.

use crate::{
    error::Result,
    index::{IndexSettings, Mapping},
};
use serde::{de::DeserializeOwned, Serialize};

/// A record type stored in its own index.
///
/// The mapping returned here is sent to the engine by
/// [`Repository::create_mapping`](crate::Repository::create_mapping) and is
/// also what queries and aggregations against this type are validated with.
///
/// # Example
///
/// ```rust
/// use catalog_search::{Document, Mapping, MappingField};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Product {
///     sku: String,
///     name: String,
///     price: f64,
/// }
///
/// impl Document for Product {
///     fn index_name() -> &'static str {
///         "products"
///     }
///
///     fn mapping() -> Mapping {
///         Mapping::new()
///             .field("sku", MappingField::keyword())
///             .field("name", MappingField::text())
///             .field("price", MappingField::double())
///     }
///
///     fn id(&self) -> String {
///         self.sku.clone()
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Index holding documents of this type.
    fn index_name() -> &'static str;

    /// Field mapping for the index.
    fn mapping() -> Mapping;

    /// Settings used when the index is created.
    fn index_settings() -> IndexSettings {
        IndexSettings::default()
    }

    /// Engine document id. Saving two documents with the same id overwrites.
    fn id(&self) -> String;

    /// Sortable mapped field holding a unique value per document, used to
    /// break ties when scanning with `search_after`. `None` sorts on `_id`.
    fn id_field() -> Option<&'static str> {
        None
    }

    /// Checks run before the document is written.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
