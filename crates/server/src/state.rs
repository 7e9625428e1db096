//! Application state shared across handlers.

use crate::cache::CacheCoordinator;
use crate::fastcache::FastCache;
use crate::liveness::Liveness;
use darkroom_core::config::AppConfig;
use darkroom_imaging::ImageBackend;
use darkroom_metadata::MetadataStore;
use darkroom_storage::{ObjectStore, OriginalsStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Durable metadata store (renditions + tokens).
    pub metadata: Arc<dyn MetadataStore>,
    /// Uploaded originals on local disk.
    pub originals: OriginalsStore,
    /// Object store for published renditions.
    pub renditions: Arc<dyn ObjectStore>,
    /// Image decode/render backend.
    pub imaging: Arc<dyn ImageBackend>,
    /// Best-effort fast tier, shared by the rendition and size caches.
    pub fast: Arc<dyn FastCache>,
    /// Two-tier rendition cache.
    pub cache: Arc<CacheCoordinator>,
    /// Durable-store health flag maintained by the liveness probe.
    pub liveness: Arc<Liveness>,
    /// Client for proxying published rendition URLs.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        originals: OriginalsStore,
        renditions: Arc<dyn ObjectStore>,
        imaging: Arc<dyn ImageBackend>,
        fast: Arc<dyn FastCache>,
    ) -> Self {
        let cache = Arc::new(CacheCoordinator::new(
            metadata.clone(),
            fast.clone(),
            &config.fast_cache,
        ));

        Self {
            config: Arc::new(config),
            metadata,
            originals,
            renditions,
            imaging,
            fast,
            cache,
            liveness: Arc::new(Liveness::new()),
            http: reqwest::Client::new(),
        }
    }

    /// Fast-tier key for a source's natural dimensions. Lives in its own
    /// namespace so rendition keys can never collide with it.
    pub fn size_cache_key(&self, name: &str) -> String {
        format!("{}size--{}", self.config.fast_cache.key_prefix, name)
    }
}
