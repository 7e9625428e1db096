//! S3-compatible rendition store using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectStore, validate_key};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;
use tracing::instrument;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

fn map_s3_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

/// S3-compatible object store. Renditions are written once and served
/// straight from the bucket (or a CDN in front of it) via `public_base_url`.
pub struct S3Backend {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`)
    ///   instead of virtual-hosted style. Required for MinIO and some
    ///   S3-compatible services.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        public_base_url: &str,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials =
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "darkroom-config");
            builder = builder.credentials_provider(credentials);
        }

        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g., "minio:9000").
            let endpoint_lower = endpoint_url.to_lowercase();
            let normalized = if endpoint_lower.starts_with("http://")
                || endpoint_lower.starts_with("https://")
            {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            };
            builder = builder.endpoint_url(normalized);
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_error)?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let marker_key = ".darkroom-health-check";

        let probe = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(marker_key)
                .body(Bytes::from_static(b"health-check").into())
                .send()
                .await
                .map_err(map_s3_error)?;

            // Best-effort cleanup; S3 delete does not error on missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(marker_key)
                .send()
                .await
                .map_err(map_s3_error)?;

            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })?
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_requires_complete_credentials() {
        let err = S3Backend::new(
            "bucket",
            None,
            Some("us-east-1".to_string()),
            Some("access".to_string()),
            None,
            "https://cdn.example.com",
            false,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::Config(_)));
    }

    #[tokio::test]
    async fn new_trims_public_base_url() {
        let backend = S3Backend::new(
            "bucket",
            Some("minio:9000".to_string()),
            Some("us-east-1".to_string()),
            Some("access".to_string()),
            Some("secret".to_string()),
            "https://cdn.example.com/",
            true,
        )
        .await
        .unwrap();

        assert_eq!(backend.public_base_url, "https://cdn.example.com");
    }
}
