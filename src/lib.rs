//! Catalog - typed item search over OpenSearch.
//!
//! Defines the [`Item`] record and an [`ItemRepository`] built on
//! `catalog-search`. Engine-independent pieces (query and aggregation
//! builders, decoders, engines) are re-exported from that crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog::{InMemoryEngine, Item, ItemRepository, RetryPolicy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> catalog::Result<()> {
//!     let items = ItemRepository::new(Arc::new(InMemoryEngine::new()), RetryPolicy::default());
//!     items.create_index().await?;
//!     items.create_mapping().await?;
//!
//!     items
//!         .save(&Item::new(1, "小米手机", "手机", "小米", 3899.99, "www.baidu.com"))
//!         .await?;
//!
//!     for item in items.find_by_price_between(3000.0, 4000.0).await? {
//!         println!("{} {}", item.title, item.price);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod item;
mod repository;

pub use item::{Item, ITEM_INDEX};
pub use repository::{BrandPrice, ItemRepository};

pub use catalog_search::*;
