//! Server test utilities.

use darkroom_core::config::{
    AppConfig, ConstraintsConfig, FastCacheConfig, ImagingConfig, MetadataConfig, ServerConfig,
    StorageConfig,
};
use darkroom_imaging::ImageProcessor;
use darkroom_metadata::{MetadataStore, SqliteStore};
use darkroom_server::fastcache::MemoryCache;
use darkroom_server::{AppState, create_router};
use darkroom_storage::{FilesystemBackend, ObjectStore, OriginalsStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with temporary stores and an in-process cache.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let originals_dir = temp_dir.path().join("originals");
        let renditions_dir = temp_dir.path().join("renditions");
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig {
            server: ServerConfig::default(),
            constraints: ConstraintsConfig::default(),
            imaging: ImagingConfig::default(),
            originals_dir: originals_dir.clone(),
            metadata: MetadataConfig::Sqlite {
                path: db_path.clone(),
            },
            storage: StorageConfig::Filesystem {
                path: renditions_dir.clone(),
                public_base_url: "http://renditions.test".to_string(),
            },
            fast_cache: FastCacheConfig::default(),
        };
        modifier(&mut config);

        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );
        let originals = OriginalsStore::new(&config.originals_dir)
            .await
            .expect("Failed to create originals store");
        let renditions: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&renditions_dir, "http://renditions.test")
                .await
                .expect("Failed to create rendition backend"),
        );
        let imaging = Arc::new(ImageProcessor::new(&config.imaging));
        let fast = Arc::new(MemoryCache::new());

        let state = AppState::new(config, metadata, originals, renditions, imaging, fast);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Seed an original image directly on disk, bypassing the upload flow.
    pub async fn seed_original(&self, name: &str, bytes: &[u8]) {
        let staged = self.state.originals.scratch_path();
        tokio::fs::write(&staged, bytes)
            .await
            .expect("Failed to stage original");
        self.state
            .originals
            .persist(&staged, name)
            .await
            .expect("Failed to persist original");
    }
}
