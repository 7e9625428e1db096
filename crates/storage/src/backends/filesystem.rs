//! Local filesystem object store backend.

use crate::error::StorageResult;
use crate::traits::{ObjectStore, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

/// Filesystem-backed rendition store, served from a public base URL by a
/// fronting web server or the proxy itself.
pub struct FilesystemBackend {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>, public_base_url: &str) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self, data), fields(backend = "filesystem"))]
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so concurrent readers never see a torn object.
        let staged = self.root.join(format!(".{}", Uuid::new_v4()));
        fs::write(&staged, &data).await?;
        fs::rename(&staged, &path).await?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn health_check(&self) -> StorageResult<()> {
        fs::metadata(&self.root).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_returns_the_public_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path(), "https://img.example.com/r/")
            .await
            .expect("backend");

        let url = backend
            .put("photo_800x600.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .expect("put");
        assert_eq!(url, "https://img.example.com/r/photo_800x600.jpg");
        assert!(dir.path().join("photo_800x600.jpg").exists());
    }

    #[tokio::test]
    async fn put_rejects_traversal_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path(), "https://img.example.com")
            .await
            .expect("backend");
        assert!(
            backend
                .put("../escape", Bytes::from_static(b"x"), "image/jpeg")
                .await
                .is_err()
        );
    }
}
