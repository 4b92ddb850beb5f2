//! Upsert writer behaviour against a real database file

mod common;

use common::{TestCache, ids, status, status_with_text, statuses};
use serde_json::json;
use statuscache::CacheError;

#[tokio::test]
async fn test_upsert_same_record_twice_keeps_last_payload() {
    let test = TestCache::new().await;
    let cache = &test.cache;

    cache
        .upsert_batch("1001", &[status_with_text(7, "first")])
        .await
        .unwrap();
    cache
        .upsert_batch("1001", &[status_with_text(7, "second")])
        .await
        .unwrap();

    assert_eq!(cache.store.count(Some("1001")).await.unwrap(), 1);
    let page = cache.load_page("1001", 0, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.records[0]["text"], "second");
}

#[tokio::test]
async fn test_leading_zero_identifiers_collide() {
    let test = TestCache::new().await;
    let cache = &test.cache;

    let mut padded = status_with_text(7, "padded");
    padded.insert("idstr".to_string(), json!("007"));
    let summary = cache.upsert_batch("1001", &[status(7), padded]).await.unwrap();

    assert_eq!(summary.written, 1);
    assert_eq!(summary.superseded, 1);
    assert_eq!(cache.store.count(Some("1001")).await.unwrap(), 1);
    let page = cache.load_page("1001", 0, 0).await.unwrap();
    assert_eq!(page.records[0]["text"], "padded");
}

#[tokio::test]
async fn test_duplicate_identifiers_in_batch_count_once() {
    let test = TestCache::new().await;
    let cache = &test.cache;

    let batch = [
        status_with_text(9, "first"),
        status(8),
        status_with_text(9, "second"),
        status_with_text(9, "third"),
    ];
    let summary = cache.upsert_batch("1001", &batch).await.unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.superseded, 2);
    assert_eq!(summary.skipped(), 0);
    assert_eq!(
        summary.written as u64,
        cache.store.count(Some("1001")).await.unwrap()
    );
    let page = cache.load_page("1001", 0, 0).await.unwrap();
    assert_eq!(ids(&page), vec![9, 8]);
    assert_eq!(page.records[0]["text"], "third");
}

#[tokio::test]
async fn test_records_without_identifier_are_skipped() {
    let test = TestCache::new().await;
    let cache = &test.cache;

    let mut no_id = status(3);
    no_id.remove("idstr");
    let mut numeric_id = status(4);
    numeric_id.insert("idstr".to_string(), json!(4));

    let summary = cache
        .upsert_batch("1001", &[status(1), no_id, status(2), numeric_id])
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped_missing_id, 2);
    assert_eq!(summary.skipped_unencodable, 0);
    assert_eq!(ids(&cache.load_page("1001", 0, 0).await.unwrap()), vec![2, 1]);
}

#[tokio::test]
async fn test_unencodable_records_are_skipped() {
    let test = TestCache::with_config(|config| config.cache.max_payload_bytes = 256).await;
    let cache = &test.cache;

    let oversized = status_with_text(2, &"x".repeat(1024));
    let summary = cache
        .upsert_batch("1001", &[status(1), oversized, status(3)])
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped_unencodable, 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(ids(&cache.load_page("1001", 0, 0).await.unwrap()), vec![3, 1]);
}

#[tokio::test]
async fn test_batch_of_only_skips_writes_nothing() {
    let test = TestCache::new().await;
    let cache = &test.cache;

    let mut no_id = status(1);
    no_id.remove("idstr");

    let summary = cache.upsert_batch("1001", &[no_id]).await.unwrap();
    assert_eq!(summary.written, 0);
    assert_eq!(summary.skipped_missing_id, 1);

    let summary = cache.upsert_batch("1001", &[]).await.unwrap();
    assert_eq!(summary.written, 0);
    assert_eq!(cache.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_write_rolls_back_whole_batch() {
    let test = TestCache::rejecting_status_id(13).await;
    let cache = &test.cache;

    cache
        .upsert_batch("1001", &[status_with_text(5, "before")])
        .await
        .unwrap();

    let batch = vec![
        status_with_text(5, "after"),
        status(12),
        status(13),
        status(14),
    ];
    let error = cache
        .upsert_batch("1001", &batch)
        .await
        .expect_err("record 13 violates the schema");
    assert!(matches!(error, CacheError::Storage(_)));

    let page = cache.load_page("1001", 0, 0).await.unwrap();
    assert_eq!(ids(&page), vec![5]);
    assert_eq!(page.records[0]["text"], "before");

    // The store keeps working after the rollback
    let summary = cache.upsert_batch("1001", &statuses([12, 14])).await.unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(
        ids(&cache.load_page("1001", 0, 0).await.unwrap()),
        vec![14, 12, 5]
    );
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let test = TestCache::new().await;
    let cache = &test.cache;

    cache.upsert_batch("alice", &statuses(1..=5)).await.unwrap();
    cache.upsert_batch("bob", &statuses(4..=8)).await.unwrap();
    cache
        .upsert_batch("alice", &[status_with_text(4, "alice's copy")])
        .await
        .unwrap();

    assert_eq!(
        ids(&cache.load_page("alice", 0, 0).await.unwrap()),
        vec![5, 4, 3, 2, 1]
    );
    let bob = cache.load_page("bob", 0, 0).await.unwrap();
    assert_eq!(ids(&bob), vec![8, 7, 6, 5, 4]);
    assert_eq!(bob.records[4]["text"], "status 4");
    assert!(cache.load_page("carol", 0, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_writers_and_readers_share_one_channel() {
    let test = TestCache::new().await;
    let cache = test.cache.clone();

    let mut handles = Vec::new();
    for owner in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let owner_id = format!("owner-{owner}");
            for chunk in 0..5i64 {
                let batch = statuses(chunk * 10 + 1..=chunk * 10 + 10);
                cache.upsert_batch(&owner_id, &batch).await.unwrap();
                cache.load_page(&owner_id, 0, 0).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.store.count(None).await.unwrap(), 8 * 50);
    for owner in 0..8 {
        let page = cache.load_page(&format!("owner-{owner}"), 0, 0).await.unwrap();
        assert_eq!(ids(&page), (31..=50).rev().collect::<Vec<_>>());
    }
}
