//! Two-tier rendition cache coordination.
//!
//! The durable metadata store is authoritative; the fast tier in front of
//! it is derived state. Lookups consult the fast tier first and back-fill
//! it on a durable hit. Stores are insert-or-ignore against the composite
//! uniqueness constraint, so duplicate concurrent generations converge on
//! one surviving row.

use crate::fastcache::FastCache;
use crate::metrics;
use darkroom_core::request::RenditionKey;
use darkroom_core::config::FastCacheConfig;
use darkroom_metadata::{MetadataStore, StoreOutcome};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub struct CacheCoordinator {
    metadata: Arc<dyn MetadataStore>,
    fast: Arc<dyn FastCache>,
    ttl: Duration,
    key_prefix: String,
}

impl CacheCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        fast: Arc<dyn FastCache>,
        config: &FastCacheConfig,
    ) -> Self {
        Self {
            metadata,
            fast,
            ttl: config.ttl(),
            key_prefix: config.key_prefix.clone(),
        }
    }

    fn fast_key(&self, key: &RenditionKey) -> String {
        format!("{}{}", self.key_prefix, key.token())
    }

    /// Resolve a rendition to its published URL, if any.
    pub async fn lookup(&self, key: &RenditionKey) -> Option<String> {
        let fast_key = self.fast_key(key);
        if let Some(url) = self.fast.get(&fast_key).await {
            metrics::CACHE_HITS.with_label_values(&["fast"]).inc();
            return Some(url);
        }

        match self.metadata.find_rendition(key).await {
            Ok(Some(url)) => {
                metrics::CACHE_HITS.with_label_values(&["durable"]).inc();
                self.fast.set(&fast_key, &url, self.ttl).await;
                Some(url)
            }
            Ok(None) => None,
            Err(err) => {
                // A durable read failure degrades to a miss; the request
                // regenerates instead of failing.
                warn!(key = %key, error = %err, "durable cache read failed, treating as miss");
                None
            }
        }
    }

    /// Record a freshly published rendition in both tiers. Never fails the
    /// request: the rendition was already served from memory.
    pub async fn store(&self, key: &RenditionKey, url: &str, rendered_at: OffsetDateTime) {
        match self.metadata.insert_rendition(key, url, rendered_at).await {
            Ok(StoreOutcome::Created) => {
                self.fast.set(&self.fast_key(key), url, self.ttl).await;
            }
            Ok(StoreOutcome::Deduplicated) => {
                // The durable row holds the concurrent winner's URL; leave
                // the fast tier for the next lookup to backfill.
                debug!(key = %key, "rendition already recorded by a concurrent generation");
            }
            Err(err) => {
                warn!(key = %key, error = %err, "durable cache write failed");
            }
        }
    }
}
