//! Token state machine tests against the SQLite store.

use darkroom_metadata::{MetadataError, SqliteStore, TokenRepo};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

async fn test_store() -> (Arc<SqliteStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::new(dir.path().join("test.db"))
        .await
        .expect("sqlite store");
    (Arc::new(store), dir)
}

/// Insert a token row with an arbitrary deadline, bypassing `create_token`.
async fn insert_raw_token(
    store: &SqliteStore,
    token_id: Uuid,
    image_id: &str,
    valid_until: OffsetDateTime,
) {
    sqlx::query("INSERT INTO tokens (id, image_id, valid_until, used) VALUES ($1, $2, $3, FALSE)")
        .bind(token_id)
        .bind(image_id)
        .bind(valid_until)
        .execute(store.pool())
        .await
        .expect("raw insert");
}

#[tokio::test]
async fn create_then_consume_then_complete() {
    let (store, _dir) = test_store().await;
    let token = Uuid::new_v4();

    store.create_token(token, "img").await.expect("create");
    assert!(store.consume_token(token, "img").await.expect("consume"));

    let row = store.get_token(token).await.expect("get").expect("row");
    assert!(row.used);
    assert!(row.uploaded_at.is_none());

    assert!(store.mark_completed(token, "img").await.expect("complete"));
    let row = store.get_token(token).await.expect("get").expect("row");
    assert!(row.uploaded_at.is_some());
}

#[tokio::test]
async fn second_create_for_live_image_id_fails_without_mutating() {
    let (store, _dir) = test_store().await;
    let first = Uuid::new_v4();
    store.create_token(first, "img").await.expect("create");

    let err = store
        .create_token(Uuid::new_v4(), "img")
        .await
        .expect_err("duplicate create must fail");
    assert!(matches!(err, MetadataError::AlreadyExists(_)));

    // The original token is untouched and still consumable.
    let row = store.get_token(first).await.expect("get").expect("row");
    assert!(!row.used);
    assert!(store.consume_token(first, "img").await.expect("consume"));
}

#[tokio::test]
async fn consume_succeeds_exactly_once_under_concurrency() {
    let (store, _dir) = test_store().await;
    let token = Uuid::new_v4();
    store.create_token(token, "img").await.expect("create");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.consume_token(token, "img").await.expect("consume")
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("join") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn consume_rejects_wrong_image_id_and_expired_tokens() {
    let (store, _dir) = test_store().await;
    let token = Uuid::new_v4();
    store.create_token(token, "img").await.expect("create");
    assert!(!store.consume_token(token, "other").await.expect("consume"));

    let expired = Uuid::new_v4();
    insert_raw_token(
        &store,
        expired,
        "stale",
        OffsetDateTime::now_utc() - Duration::hours(1),
    )
    .await;
    assert!(!store.consume_token(expired, "stale").await.expect("consume"));
}

#[tokio::test]
async fn expired_unused_token_does_not_block_reissue() {
    let (store, _dir) = test_store().await;
    insert_raw_token(
        &store,
        Uuid::new_v4(),
        "img",
        OffsetDateTime::now_utc() - Duration::hours(1),
    )
    .await;

    // The expired row is purged on the way in, so a fresh create succeeds.
    store
        .create_token(Uuid::new_v4(), "img")
        .await
        .expect("reissue after expiry");
}

#[tokio::test]
async fn release_frees_the_image_id_slot() {
    let (store, _dir) = test_store().await;
    let token = Uuid::new_v4();
    store.create_token(token, "img").await.expect("create");
    assert!(store.consume_token(token, "img").await.expect("consume"));

    assert_eq!(store.release_token("img").await.expect("release"), 1);
    // Released exactly once; the second release is a no-op.
    assert_eq!(store.release_token("img").await.expect("release"), 0);

    store
        .create_token(Uuid::new_v4(), "img")
        .await
        .expect("create after release");
}

#[tokio::test]
async fn completed_upload_keeps_the_slot_taken() {
    let (store, _dir) = test_store().await;
    let token = Uuid::new_v4();
    store.create_token(token, "img").await.expect("create");
    assert!(store.consume_token(token, "img").await.expect("consume"));
    assert!(store.mark_completed(token, "img").await.expect("complete"));

    // A completed row is the permanent upload record; release skips it and
    // create keeps failing.
    assert_eq!(store.release_token("img").await.expect("release"), 0);
    let err = store
        .create_token(Uuid::new_v4(), "img")
        .await
        .expect_err("slot must stay taken");
    assert!(matches!(err, MetadataError::AlreadyExists(_)));
}

#[tokio::test]
async fn mark_completed_is_idempotent() {
    let (store, _dir) = test_store().await;
    let token = Uuid::new_v4();
    store.create_token(token, "img").await.expect("create");
    assert!(store.consume_token(token, "img").await.expect("consume"));
    assert!(store.mark_completed(token, "img").await.expect("complete"));
    assert!(!store.mark_completed(token, "img").await.expect("repeat"));
}

#[tokio::test]
async fn cleanup_sweeps_only_expired_unused_rows() {
    let (store, _dir) = test_store().await;
    let live = Uuid::new_v4();
    store.create_token(live, "live").await.expect("create");

    insert_raw_token(
        &store,
        Uuid::new_v4(),
        "stale-a",
        OffsetDateTime::now_utc() - Duration::minutes(30),
    )
    .await;
    insert_raw_token(
        &store,
        Uuid::new_v4(),
        "stale-b",
        OffsetDateTime::now_utc() - Duration::days(2),
    )
    .await;

    assert_eq!(store.cleanup_expired().await.expect("cleanup"), 2);
    assert!(store.get_token(live).await.expect("get").is_some());
}
