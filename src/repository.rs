//! Item repository with named queries.

use crate::item::Item;
use catalog_log::debug;
use catalog_search::{
    Aggregation, Aggregations, Page, Query, Repository, Result, RetryPolicy, SearchConfig,
    SearchEngine, SearchError, SearchRequest, Sort,
};
use std::{ops::Deref, sync::Arc};

const BRANDS: &str = "brands";
const PRICE_AVG: &str = "priceAvg";
/// Brand buckets asked for on the first try.
const BRAND_BUCKETS: usize = 100;

/// Average price of one brand's items.
#[derive(Debug, Clone, PartialEq)]
pub struct BrandPrice {
    /// Brand name.
    pub brand: String,
    /// Number of items of this brand.
    pub count: u64,
    /// Mean price, `None` if no item carried a price.
    pub average_price: Option<f64>,
}

/// [`Repository`] of [`Item`]s plus item-specific queries.
///
/// The generic operations (`save`, `save_all`, `find_all`, `search`, ...)
/// are reachable through `Deref`.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    inner: Repository<Item>,
}

impl ItemRepository {
    /// Item repository over `engine`.
    pub fn new(engine: Arc<dyn SearchEngine>, policy: RetryPolicy) -> Self {
        Self {
            inner: Repository::new(engine, policy),
        }
    }

    /// Item repository configured from `config`.
    pub fn with_config(engine: Arc<dyn SearchEngine>, config: &SearchConfig) -> Self {
        Self {
            inner: Repository::with_config(engine, config),
        }
    }

    /// Items per request when listing whole result sets.
    pub fn scan_size(self, size: usize) -> Self {
        Self {
            inner: self.inner.scan_size(size),
        }
    }

    /// Fetch an item by id.
    pub async fn find_by_id(&self, id: u64) -> Result<Option<Item>> {
        self.inner.find_by_id(&id.to_string()).await
    }

    /// Items priced in `[low, high]`, cheapest first.
    pub async fn find_by_price_between(&self, low: f64, high: f64) -> Result<Vec<Item>> {
        if !low.is_finite() || !high.is_finite() {
            return Err(SearchError::InvalidQuery(format!(
                "price bounds must be finite, got [{}, {}]",
                low, high
            )));
        }
        if low > high {
            return Err(SearchError::InvalidQuery(format!(
                "lower price bound {} exceeds upper bound {}",
                low, high
            )));
        }

        self.inner
            .find_all_matching(Query::between("price", low, high), [Sort::asc("price")])
            .await
    }

    /// Every item of `brand`, most expensive first.
    pub async fn find_by_brand(&self, brand: &str) -> Result<Vec<Item>> {
        self.inner
            .find_all_matching(Query::term("brand", brand), [Sort::desc("price")])
            .await
    }

    /// Full-text search on the title, best match first.
    pub async fn search_title(&self, text: &str, page: usize, size: usize) -> Result<Page<Item>> {
        let request = SearchRequest::new()
            .query(Query::matching("title", text))
            .page(page, size);
        self.inner.search(&request).await
    }

    /// Item count and mean price per brand, largest brand first. Every
    /// brand is reported, however many there are.
    pub async fn average_price_by_brand(&self) -> Result<Vec<BrandPrice>> {
        let mut aggregations = self.brand_prices(BRAND_BUCKETS).await?;
        let terms = aggregations.terms(BRANDS)?;
        if !terms.is_complete() {
            // each leftover document may be a brand of its own
            let size = terms.buckets.len() + terms.sum_other_doc_count as usize;
            debug!("More than {} brands, asking for {}", terms.buckets.len(), size);
            aggregations = self.brand_prices(size).await?;
        }

        let terms = aggregations.terms(BRANDS)?;
        if !terms.is_complete() {
            return Err(SearchError::Internal(format!(
                "brand aggregation left {} items outside its {} buckets",
                terms.sum_other_doc_count,
                terms.buckets.len()
            )));
        }

        terms
            .buckets
            .iter()
            .map(|bucket| -> Result<BrandPrice> {
                Ok(BrandPrice {
                    brand: bucket.key.clone(),
                    count: bucket.doc_count,
                    average_price: bucket.metric(PRICE_AVG)?,
                })
            })
            .collect()
    }

    async fn brand_prices(&self, buckets: usize) -> Result<Aggregations> {
        let request = SearchRequest::new().aggregation(
            BRANDS,
            Aggregation::terms("brand")
                .size(buckets)
                .sub_aggregation(PRICE_AVG, Aggregation::avg("price")),
        );
        self.inner.aggregate(&request).await
    }
}

impl Deref for ItemRepository {
    type Target = Repository<Item>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
