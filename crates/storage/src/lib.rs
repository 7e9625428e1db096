//! Storage for uploaded originals and rendered output.
//!
//! Two distinct stores live here:
//! - [`OriginalsStore`]: a local directory of immutable source images.
//! - [`ObjectStore`]: write-once publication of rendered variants to a
//!   filesystem directory or an S3-compatible bucket, returning the public
//!   URL a client is redirected to.

pub mod backends;
pub mod error;
pub mod originals;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use originals::OriginalsStore;
pub use traits::ObjectStore;

use darkroom_core::config::StorageConfig;
use std::sync::Arc;

/// Create a rendition object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            public_base_url,
        } => {
            let backend = FilesystemBackend::new(path, public_base_url).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            access_key_id,
            secret_access_key,
            public_base_url,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                public_base_url,
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
