//! Durable rendition cache tests against the SQLite store.

use darkroom_core::{Fit, OutputFormat, RenditionKey};
use darkroom_metadata::{RenditionRepo, SqliteStore, StoreOutcome};
use time::OffsetDateTime;

async fn test_store() -> (SqliteStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::new(dir.path().join("test.db"))
        .await
        .expect("sqlite store");
    (store, dir)
}

fn key(name: &str, width: u32, height: u32) -> RenditionKey {
    RenditionKey {
        name: name.to_string(),
        width,
        height,
        fit: Fit::Clip,
        format: OutputFormat::Jpeg,
        blur: false,
        quality: -1,
    }
}

#[tokio::test]
async fn insert_then_find_round_trips_the_url() {
    let (store, _dir) = test_store().await;
    let key = key("photo", 800, 600);

    assert!(store.find_rendition(&key).await.expect("find").is_none());

    let outcome = store
        .insert_rendition(&key, "https://cdn.example.com/a", OffsetDateTime::now_utc())
        .await
        .expect("insert");
    assert_eq!(outcome, StoreOutcome::Created);

    let url = store.find_rendition(&key).await.expect("find");
    assert_eq!(url.as_deref(), Some("https://cdn.example.com/a"));
}

#[tokio::test]
async fn duplicate_insert_deduplicates_and_first_row_wins() {
    let (store, _dir) = test_store().await;
    let key = key("photo", 800, 600);
    let now = OffsetDateTime::now_utc();

    store
        .insert_rendition(&key, "https://cdn.example.com/first", now)
        .await
        .expect("insert");
    let outcome = store
        .insert_rendition(&key, "https://cdn.example.com/second", now)
        .await
        .expect("duplicate insert must not error");
    assert_eq!(outcome, StoreOutcome::Deduplicated);

    let url = store.find_rendition(&key).await.expect("find");
    assert_eq!(url.as_deref(), Some("https://cdn.example.com/first"));
}

#[tokio::test]
async fn distinct_keys_do_not_collide() {
    let (store, _dir) = test_store().await;
    let now = OffsetDateTime::now_utc();

    let plain = key("photo", 100, 100);
    let blurred = RenditionKey {
        blur: true,
        ..plain.clone()
    };
    let quality = RenditionKey {
        quality: 80,
        ..plain.clone()
    };
    let cropped = RenditionKey {
        fit: Fit::Crop,
        ..plain.clone()
    };

    for (k, url) in [
        (&plain, "u-plain"),
        (&blurred, "u-blur"),
        (&quality, "u-quality"),
        (&cropped, "u-crop"),
    ] {
        assert_eq!(
            store.insert_rendition(k, url, now).await.expect("insert"),
            StoreOutcome::Created
        );
    }

    assert_eq!(
        store.find_rendition(&blurred).await.expect("find").as_deref(),
        Some("u-blur")
    );
    assert_eq!(
        store.find_rendition(&cropped).await.expect("find").as_deref(),
        Some("u-crop")
    );
}
