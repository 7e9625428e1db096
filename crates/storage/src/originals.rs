//! The append-only originals store.
//!
//! A local directory of source files keyed by image name. Entries are
//! created once at upload completion and immutable thereafter; the token
//! state machine, not the filesystem, enforces the one-upload-per-name
//! rule. Writes go through a temp file and an atomic rename so readers
//! never observe a partial original.

use crate::error::{StorageError, StorageResult};
use crate::traits::validate_key;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Filesystem store for uploaded originals.
#[derive(Debug, Clone)]
pub struct OriginalsStore {
    root: PathBuf,
}

impl OriginalsStore {
    /// Open the store, creating the root and scratch directories.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self { root })
    }

    /// Resolve the on-disk path for a name, rejecting traversal attempts.
    pub fn path(&self, name: &str) -> StorageResult<PathBuf> {
        validate_key(name)?;
        Ok(self.root.join(name))
    }

    /// Whether a readable original exists under this name.
    pub async fn exists(&self, name: &str) -> bool {
        match self.path(name) {
            Ok(path) => fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Read an original in full.
    pub async fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.path(name)?;
        fs::read(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(err)
            }
        })
    }

    /// Allocate a scratch path inside the store, so the final rename stays
    /// on one filesystem.
    pub fn scratch_path(&self) -> PathBuf {
        self.root.join(".tmp").join(Uuid::new_v4().to_string())
    }

    /// Atomically move a fully-written file into place under `name`.
    pub async fn persist(&self, staged: &Path, name: &str) -> StorageResult<PathBuf> {
        let destination = self.path(name)?;
        fs::rename(staged, &destination).await?;
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_makes_the_original_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OriginalsStore::new(dir.path()).await.expect("store");

        assert!(!store.exists("photo").await);

        let staged = store.scratch_path();
        fs::write(&staged, b"bytes").await.expect("write");
        store.persist(&staged, "photo").await.expect("persist");

        assert!(store.exists("photo").await);
        assert_eq!(store.read("photo").await.expect("read"), b"bytes");
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OriginalsStore::new(dir.path()).await.expect("store");
        assert!(store.path("../escape").is_err());
        assert!(!store.exists("../escape").await);
        assert!(matches!(
            store.read("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
