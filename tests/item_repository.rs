//! Integration tests for the item repository.

use catalog::*;
use std::sync::Arc;
use std::time::Duration;

fn phones() -> Vec<Item> {
    let image = "http://image.leyou.com/13123.jpg";
    vec![
        Item::new(1, "小米手机", "手机", "小米", 3899.99, "www.baidu.com"),
        Item::new(2, "坚果手机R1", "手机", "锤子", 3999.99, "www.baidu.com"),
        Item::new(3, "华为META10", "手机", "华为", 4000.99, "www.baidu.com"),
        Item::new(5, "小米手机7", "手机", "小米", 3299.00, image),
        Item::new(6, "果手机R1", "手机", "锤子", 3699.00, image),
        Item::new(7, "为META10", "手机", "华为", 4499.00, image),
        Item::new(8, "小米Mix2S", "手机", "小米", 4299.00, image),
        Item::new(9, "荣耀V10", "手机", "华为", 2799.00, image),
    ]
}

async fn empty_repository() -> (InMemoryEngine, ItemRepository) {
    let engine = InMemoryEngine::new();
    let items = ItemRepository::new(
        Arc::new(engine.clone()),
        RetryPolicy::no_retry(Duration::from_secs(1)),
    );
    items.create_index().await.unwrap();
    items.create_mapping().await.unwrap();
    (engine, items)
}

async fn stocked_repository() -> ItemRepository {
    let (_, items) = empty_repository().await;
    assert_eq!(items.save_all(&phones()).await.unwrap(), 8);
    items
}

fn ids(items: &[Item]) -> Vec<u64> {
    items.iter().map(|i| i.id).collect()
}

// =============================================================================
// Index lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_index_and_mapping_are_idempotent() {
    let (engine, items) = empty_repository().await;
    items.create_index().await.unwrap();
    items.create_mapping().await.unwrap();

    let settings = engine.settings(ITEM_INDEX).unwrap();
    assert_eq!(settings["number_of_shards"], 3);
    assert_eq!(settings["number_of_replicas"], 2);

    let mapping = engine.mapping(ITEM_INDEX).unwrap();
    assert_eq!(mapping, Item::mapping());
    assert!(!mapping.get("images").unwrap().is_indexed());
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_save_then_find_by_id() {
    let (_, items) = empty_repository().await;
    let phone = Item::new(1, "小米手机", "手机", "小米", 3899.99, "www.baidu.com");
    items.save(&phone).await.unwrap();

    assert_eq!(items.find_by_id(1).await.unwrap(), Some(phone));
    assert_eq!(items.find_by_id(4).await.unwrap(), None);
}

#[tokio::test]
async fn test_save_existing_id_overwrites_every_field() {
    let items = stocked_repository().await;
    let replacement = Item::new(2, "坚果Pro", "平板", "锤子科技", 1999.0, "none");
    items.save(&replacement).await.unwrap();

    assert_eq!(items.find_by_id(2).await.unwrap(), Some(replacement));
    assert_eq!(items.count(&Query::MatchAll).await.unwrap(), 8);
}

#[tokio::test]
async fn test_negative_price_is_rejected_before_io() {
    let (engine, items) = empty_repository().await;
    let broken = Item::new(10, "坏手机", "手机", "小米", -1.0, "");

    let err = items.save(&broken).await.unwrap_err();
    assert!(matches!(err, SearchError::Validation(_)));

    let mut batch = phones();
    batch.push(broken);
    assert!(matches!(items.save_all(&batch).await, Err(SearchError::Validation(_))));
    assert!(engine.is_empty(ITEM_INDEX));
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_find_all_by_price_desc() {
    let items = stocked_repository().await;
    let all = items.find_all([Sort::desc("price")]).await.unwrap();

    assert_eq!(all.len(), 8);
    assert!(all.windows(2).all(|pair| pair[0].price >= pair[1].price));
    assert_eq!(all[0].id, 7);
}

#[tokio::test]
async fn test_find_by_price_between_is_inclusive() {
    let items = stocked_repository().await;

    let found = items.find_by_price_between(3000.0, 4000.0).await.unwrap();
    assert_eq!(ids(&found), vec![5, 6, 1, 2]);
    assert!(found.iter().all(|i| (3000.0..=4000.0).contains(&i.price)));

    let edges = items.find_by_price_between(3299.0, 3999.99).await.unwrap();
    assert_eq!(ids(&edges), vec![5, 6, 1, 2]);

    let single = items.find_by_price_between(2799.0, 2799.0).await.unwrap();
    assert_eq!(ids(&single), vec![9]);
}

#[tokio::test]
async fn test_find_by_price_between_rejects_bad_bounds() {
    let items = stocked_repository().await;
    assert!(matches!(
        items.find_by_price_between(4000.0, 3000.0).await,
        Err(SearchError::InvalidQuery(_))
    ));
    assert!(matches!(
        items.find_by_price_between(f64::NAN, 3000.0).await,
        Err(SearchError::InvalidQuery(_))
    ));
}

#[tokio::test]
async fn test_find_by_brand() {
    let items = stocked_repository().await;
    let xiaomi = items.find_by_brand("小米").await.unwrap();
    assert_eq!(ids(&xiaomi), vec![8, 1, 5]);
    assert!(items.find_by_brand("苹果").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_match_query_on_title() {
    let items = stocked_repository().await;
    let page = items.search_title("小米", 0, 10).await.unwrap();
    assert_eq!(ids(&page.items), vec![1, 5, 8]);
}

#[tokio::test]
async fn test_paging_three_per_page_over_five_matches() {
    let items = stocked_repository().await;

    let first = items.search_title("小米手机", 0, 3).await.unwrap();
    assert_eq!(first.total_elements, 5);
    assert_eq!(first.total_pages, 2);
    assert_eq!((first.page_number, first.page_size), (0, 3));
    assert_eq!(ids(&first.items), vec![1, 5, 2]);

    let second = items.search_title("小米手机", 1, 3).await.unwrap();
    assert_eq!(ids(&second.items), vec![6, 8]);

    let past_end = items.search_title("小米手机", 7, 3).await.unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_term_on_keyword_with_sort() {
    let items = stocked_repository().await;
    let request = SearchRequest::new()
        .query(Query::term("brand", "华为"))
        .sort("price", SortOrder::Desc);

    let page = items.search(&request).await.unwrap();
    assert_eq!(ids(&page.items), vec![7, 3, 9]);
}

#[tokio::test]
async fn test_invalid_requests() {
    let items = stocked_repository().await;

    // misspelled field
    let request = SearchRequest::new().query(Query::matching("categroy", "手机"));
    assert!(matches!(items.search(&request).await, Err(SearchError::InvalidQuery(_))));

    let request = SearchRequest::new().query(Query::term("title", "小米"));
    assert!(matches!(items.search(&request).await, Err(SearchError::InvalidQuery(_))));

    let request = SearchRequest::new().page(0, 0);
    assert!(matches!(items.search(&request).await, Err(SearchError::InvalidQuery(_))));

    let request = SearchRequest::new().sort("images", SortOrder::Asc);
    assert!(matches!(items.search(&request).await, Err(SearchError::InvalidQuery(_))));
}

// =============================================================================
// Aggregations
// =============================================================================

#[tokio::test]
async fn test_terms_aggregation_by_brand() {
    let items = stocked_repository().await;
    let request = SearchRequest::new()
        .without_source()
        .aggregation("brands", Aggregation::terms("brand"));

    let aggs = items.aggregate(&request).await.unwrap();
    let buckets = aggs.buckets("brands").unwrap();
    let counts: Vec<(&str, u64)> = buckets.iter().map(|b| (b.key.as_str(), b.doc_count)).collect();
    assert_eq!(counts, vec![("华为", 3), ("小米", 3), ("锤子", 2)]);
}

#[tokio::test]
async fn test_average_price_per_brand() {
    let (_, items) = empty_repository().await;
    items
        .save_all(&[
            Item::new(1, "a", "手机", "X", 10.0, ""),
            Item::new(2, "b", "手机", "X", 20.0, ""),
            Item::new(3, "c", "手机", "Y", 5.0, ""),
        ])
        .await
        .unwrap();

    let averages = items.average_price_by_brand().await.unwrap();
    assert_eq!(
        averages,
        vec![
            BrandPrice { brand: "X".into(), count: 2, average_price: Some(15.0) },
            BrandPrice { brand: "Y".into(), count: 1, average_price: Some(5.0) },
        ]
    );
}

#[tokio::test]
async fn test_average_price_over_original_data() {
    let items = stocked_repository().await;
    let averages = items.average_price_by_brand().await.unwrap();

    let xiaomi = averages.iter().find(|b| b.brand == "小米").unwrap();
    let expected = (3899.99 + 3299.0 + 4299.0) / 3.0;
    assert!((xiaomi.average_price.unwrap() - expected).abs() < 1e-6);
}

#[tokio::test]
async fn test_invalid_aggregations() {
    let items = stocked_repository().await;

    let duplicate = SearchRequest::new()
        .aggregation("brands", Aggregation::terms("brand"))
        .aggregation("brands", Aggregation::avg("price"));
    assert!(matches!(
        items.aggregate(&duplicate).await,
        Err(SearchError::InvalidAggregation(_))
    ));

    let on_text = SearchRequest::new().aggregation("titles", Aggregation::terms("title"));
    assert!(matches!(
        items.aggregate(&on_text).await,
        Err(SearchError::InvalidAggregation(_))
    ));

    let valid = SearchRequest::new().aggregation("brands", Aggregation::terms("brand"));
    let aggs = items.aggregate(&valid).await.unwrap();
    assert!(matches!(aggs.get("brandz"), Err(SearchError::AggregationNotFound(_))));
}

#[tokio::test]
async fn test_average_price_reports_more_than_ten_brands() {
    let (_, items) = empty_repository().await;
    let batch: Vec<Item> = (0..12)
        .map(|i| Item::new(i, "t", "手机", &format!("B{:02}", i), 100.0 + i as f64, ""))
        .collect();
    items.save_all(&batch).await.unwrap();

    let averages = items.average_price_by_brand().await.unwrap();
    assert_eq!(averages.len(), 12);
    let last = averages.iter().find(|b| b.brand == "B11").unwrap();
    assert_eq!(last.count, 1);
    assert_eq!(last.average_price, Some(111.0));
}

#[tokio::test]
async fn test_average_price_asks_again_when_buckets_run_out() {
    let (_, items) = empty_repository().await;
    let batch: Vec<Item> = (0..120)
        .map(|i| Item::new(i, "t", "手机", &format!("B{:03}", i), 1.0, ""))
        .collect();
    items.save_all(&batch).await.unwrap();

    let averages = items.average_price_by_brand().await.unwrap();
    assert_eq!(averages.len(), 120);
    assert_eq!(averages.iter().map(|b| b.count).sum::<u64>(), 120);
}

#[tokio::test]
async fn test_search_without_source_keeps_totals_and_aggregations() {
    let items = stocked_repository().await;
    let request = SearchRequest::new()
        .query(Query::term("category", "手机"))
        .without_source()
        .aggregation("brands", Aggregation::terms("brand"));

    let page = items.search(&request).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_elements, 8);
    assert_eq!(page.aggregations.buckets("brands").unwrap().len(), 3);
}

// =============================================================================
// Result window
// =============================================================================

async fn windowed_repository() -> ItemRepository {
    let engine = InMemoryEngine::new();
    engine
        .create_index(ITEM_INDEX, &serde_json::json!({ "settings": { "max_result_window": 4 } }))
        .await
        .unwrap();
    let items = ItemRepository::new(
        Arc::new(engine),
        RetryPolicy::no_retry(Duration::from_secs(1)),
    )
    .scan_size(3);
    items.create_index().await.unwrap();
    items.create_mapping().await.unwrap();
    items.save_all(&phones()).await.unwrap();
    items
}

#[tokio::test]
async fn test_listings_are_not_capped_by_result_window() {
    let items = windowed_repository().await;

    let all = items.find_by_price_between(0.0, 10_000.0).await.unwrap();
    assert_eq!(ids(&all), vec![9, 5, 6, 1, 2, 3, 8, 7]);

    let xiaomi = items.find_by_brand("小米").await.unwrap();
    assert_eq!(ids(&xiaomi), vec![8, 1, 5]);

    assert_eq!(items.find_all([Sort::asc("id")]).await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_page_past_the_last_item_is_empty() {
    let items = windowed_repository().await;
    let page = items.search(&SearchRequest::new().page(5, 2)).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_elements, 8);
    assert_eq!(page.page_number, 5);
}
