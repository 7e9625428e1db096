//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;

/// Object store for published renditions.
///
/// Writes are fire-and-forget from the request's perspective: a failed
/// publish is logged and the rendition simply regenerates next time.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object and return the public URL it is reachable under.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    /// Verify the backend is reachable and writable enough to serve.
    async fn health_check(&self) -> StorageResult<()>;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Validate an object key: relative, no traversal, no unusual components.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!(
            "path traversal not allowed: {key}"
        )));
    }
    for component in std::path::Path::new(key).components() {
        match component {
            std::path::Component::Normal(_) => {}
            _ => {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }
    }
    Ok(())
}
