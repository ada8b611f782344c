//! Item walkthrough
//!
//! Creates the `item` index, saves and updates phones, then runs the usual
//! queries and aggregations over them.
//!
//! Runs against the in-memory engine by default. Set `CATALOG_SEARCH_URL`
//! (see `SearchConfig::from_env`) to run against a cluster; the title field
//! uses the `ik_max_word` analyzer, so the cluster needs the IK plugin.
//!
//! ```bash
//! cargo run --example item_walkthrough
//! CATALOG_SEARCH_URL=http://localhost:9200 cargo run --example item_walkthrough
//! ```

use catalog::{
    Aggregation, InMemoryEngine, Item, ItemRepository, OpenSearchEngine, Query, RetryPolicy,
    SearchConfig, SearchEngine, SearchRequest, Sort, SortOrder,
};
use catalog_log::{info, warn};
use std::sync::Arc;

const IMAGE: &str = "http://image.leyou.com/13123.jpg";

fn print_items(items: &[Item]) {
    for item in items {
        println!("  {:>2} {:<12} {:<4} {:<4} {:>8.2}", item.id, item.title, item.category, item.brand, item.price);
    }
}

fn repository() -> Result<ItemRepository, Box<dyn std::error::Error>> {
    if std::env::var("CATALOG_SEARCH_URL").is_ok() {
        let config = SearchConfig::from_env()?;
        info!("Using cluster at {:?}", config.urls);
        let engine: Arc<dyn SearchEngine> = Arc::new(OpenSearchEngine::new(&config)?);
        Ok(ItemRepository::with_config(engine, &config))
    } else {
        info!("CATALOG_SEARCH_URL not set, using the in-memory engine");
        Ok(ItemRepository::new(
            Arc::new(InMemoryEngine::new()),
            RetryPolicy::default(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    catalog_log::init();
    let items = repository()?;

    println!("=== Index and mapping ===\n");
    items.create_index().await?;
    items.create_mapping().await?;
    println!("index '{}' ready\n", items.index_name());

    println!("=== Save, batch save, update ===\n");
    items
        .save(&Item::new(1, "小米手机", "手机", "小米", 3899.99, "www.baidu.com"))
        .await?;
    items
        .save_all(&[
            Item::new(2, "坚果手机R1", "手机", "锤子", 3999.99, "www.baidu.com"),
            Item::new(3, "华为META10", "手机", "华为", 4000.99, "www.baidu.com"),
        ])
        .await?;
    // same id, so this replaces item 2
    items
        .save(&Item::new(2, "坚果手机R1", "手机", "锤子", 3999.99, "www.baidu.com"))
        .await?;

    println!("All items by price, highest first:");
    print_items(&items.find_all([Sort::desc("price")]).await?);

    println!("\nItem 1: {:?}\n", items.find_by_id(1).await?);

    let saved = items
        .save_all(&[
            Item::new(5, "小米手机7", "手机", "小米", 3299.00, IMAGE),
            Item::new(6, "果手机R1", "手机", "锤子", 3699.00, IMAGE),
            Item::new(7, "为META10", "手机", "华为", 4499.00, IMAGE),
            Item::new(8, "小米Mix2S", "手机", "小米", 4299.00, IMAGE),
            Item::new(9, "荣耀V10", "手机", "华为", 2799.00, IMAGE),
        ])
        .await?;
    println!("Saved {} more items\n", saved);

    println!("=== Queries ===\n");
    println!("Priced between 3000 and 4000:");
    print_items(&items.find_by_price_between(3000.0, 4000.0).await?);

    println!("\nTitle matches '小米':");
    print_items(&items.search_title("小米", 0, 10).await?.items);

    let page = items.search_title("小米手机", 0, 10).await?;
    println!(
        "\nTitle matches '小米手机': {} items over {} page(s)",
        page.total_elements, page.total_pages
    );

    let misspelled = SearchRequest::new().query(Query::matching("categroy", "手机"));
    if let Err(e) = items.search(&misspelled).await {
        warn!("Rejected before sending: {}", e);
    }

    let page = items
        .search(
            &SearchRequest::new()
                .query(Query::matching("category", "手机"))
                .page(0, 3),
        )
        .await?;
    println!(
        "\nCategory '手机', page {} of size {}: {} total, {} pages",
        page.page_number, page.page_size, page.total_elements, page.total_pages
    );
    print_items(&page.items);

    let huawei = items
        .search(
            &SearchRequest::new()
                .query(Query::term("brand", "华为"))
                .sort("price", SortOrder::Desc),
        )
        .await?;
    println!("\nBrand '华为' by price, highest first:");
    print_items(&huawei.items);

    println!("\n=== Aggregations ===\n");
    let brands = items
        .aggregate(
            &SearchRequest::new()
                .without_source()
                .aggregation("brands", Aggregation::terms("brand")),
        )
        .await?;
    for bucket in brands.buckets("brands")? {
        println!("  {} {}", bucket.key, bucket.doc_count);
    }

    println!("\nAverage price per brand:");
    for brand in items.average_price_by_brand().await? {
        println!(
            "  {}.{} {:.2}",
            brand.brand,
            brand.count,
            brand.average_price.unwrap_or_default()
        );
    }

    Ok(())
}
