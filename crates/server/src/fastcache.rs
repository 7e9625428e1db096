//! The fast cache tier.
//!
//! A best-effort string map in front of the durable metadata store. Redis
//! when configured, an in-process map otherwise. Every failure here
//! degrades to a miss or a dropped write; nothing in this module is
//! allowed to fail a request.

use darkroom_core::config::FastCacheConfig;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Best-effort key/value cache with per-entry TTL.
#[async_trait]
pub trait FastCache: Send + Sync {
    /// Read an entry. Backend errors surface as a miss.
    async fn get(&self, key: &str) -> Option<String>;

    /// Write an entry. Backend errors are logged and dropped.
    async fn set(&self, key: &str, value: &str, ttl: Duration);
}

/// Redis-backed fast cache using a shared multiplexed connection.
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl FastCache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %err, "redis read failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.conn.clone();
        if let Err(err) = conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
        {
            warn!(key = %key, error = %err, "redis write failed, dropping entry");
        }
    }
}

/// In-process fallback used when no redis URL is configured. Expiry is
/// enforced lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        }
    }
}

/// Build the fast tier from configuration.
pub async fn from_config(config: &FastCacheConfig) -> anyhow::Result<Arc<dyn FastCache>> {
    match &config.redis_url {
        Some(url) => {
            let cache = RedisCache::connect(url).await?;
            tracing::info!("Fast cache backed by redis");
            Ok(Arc::new(cache))
        }
        None => {
            tracing::info!("No redis URL configured, using in-process fast cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trips() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await, None);
        cache.set("k", "v", Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
