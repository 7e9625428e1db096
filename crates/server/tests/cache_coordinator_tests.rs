//! Two-tier cache coordination tests.

mod common;

use darkroom_core::config::FastCacheConfig;
use darkroom_core::request::{Fit, OutputFormat, RenditionKey};
use darkroom_metadata::{MetadataStore, SqliteStore};
use darkroom_server::cache::CacheCoordinator;
use darkroom_server::fastcache::{FastCache, MemoryCache};
use std::sync::Arc;
use time::OffsetDateTime;

fn key(name: &str) -> RenditionKey {
    RenditionKey {
        name: name.to_string(),
        width: 320,
        height: 240,
        fit: Fit::Clip,
        format: OutputFormat::Jpeg,
        blur: false,
        quality: -1,
    }
}

async fn sqlite_store(dir: &tempfile::TempDir) -> Arc<dyn MetadataStore> {
    let db_path = dir.path().join("metadata.db");
    Arc::new(SqliteStore::new(&db_path).await.expect("sqlite store"))
}

#[tokio::test]
async fn stored_renditions_are_found_again() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = sqlite_store(&dir).await;
    let fast: Arc<dyn FastCache> = Arc::new(MemoryCache::new());
    let cache = CacheCoordinator::new(metadata, fast, &FastCacheConfig::default());

    let key = key("photo");
    assert_eq!(cache.lookup(&key).await, None);

    cache
        .store(&key, "http://cdn.test/a", OffsetDateTime::now_utc())
        .await;
    assert_eq!(cache.lookup(&key).await, Some("http://cdn.test/a".into()));
}

#[tokio::test]
async fn durable_hits_survive_a_cold_fast_tier() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = sqlite_store(&dir).await;

    let warm = CacheCoordinator::new(
        metadata.clone(),
        Arc::new(MemoryCache::new()),
        &FastCacheConfig::default(),
    );
    let key = key("photo");
    warm.store(&key, "http://cdn.test/a", OffsetDateTime::now_utc())
        .await;

    // A second instance with an empty fast tier still resolves the URL
    // from the durable store.
    let cold = CacheCoordinator::new(
        metadata,
        Arc::new(MemoryCache::new()),
        &FastCacheConfig::default(),
    );
    assert_eq!(cold.lookup(&key).await, Some("http://cdn.test/a".into()));
}

#[tokio::test]
async fn concurrent_stores_converge_on_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = sqlite_store(&dir).await;
    let fast: Arc<dyn FastCache> = Arc::new(MemoryCache::new());
    let cache = CacheCoordinator::new(metadata, fast, &FastCacheConfig::default());

    let key = key("photo");
    let now = OffsetDateTime::now_utc();
    cache.store(&key, "http://cdn.test/first", now).await;
    cache.store(&key, "http://cdn.test/second", now).await;

    // First write wins; the duplicate insert is ignored.
    assert_eq!(
        cache.lookup(&key).await,
        Some("http://cdn.test/first".into())
    );
}
