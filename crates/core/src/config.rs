//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    #[serde(default)]
    pub imaging: ImagingConfig,
    /// Directory holding uploaded originals, keyed by image name.
    #[serde(default = "default_originals_dir")]
    pub originals_dir: PathBuf,
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fast_cache: FastCacheConfig,
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:1337").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Whether robots.txt allows indexing.
    #[serde(default)]
    pub allow_indexing: bool,
    /// Proxy cached rendition URLs through this service instead of
    /// redirecting clients to them.
    #[serde(default)]
    pub proxy_renditions: bool,
    /// Optional `Cache-Control: max-age` on cache-hit redirects, seconds.
    #[serde(default)]
    pub redirect_cache_max_age_secs: Option<u64>,
    /// Maximum accepted upload body size in bytes. This caps the encoded
    /// request; the megapixel budget caps the decoded area separately.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            allow_indexing: false,
            proxy_renditions: false,
            redirect_cache_max_age_secs: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Output and input size limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstraintsConfig {
    /// Maximum rendition width in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,
    /// Maximum rendition height in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,
    /// Maximum decoded upload area in megapixels.
    #[serde(default = "default_megapixels")]
    pub max_input_megapixels: u32,
    /// Maximum stored original area in megapixels. Uploads are downscaled
    /// (never upscaled) so the longer axis fits within this budget.
    #[serde(default = "default_megapixels")]
    pub max_on_disk_megapixels: u32,
}

impl ConstraintsConfig {
    /// Longest axis allowed for a stored original, derived from the on-disk
    /// megapixel budget.
    pub fn max_on_disk_axis(&self) -> u32 {
        ((self.max_on_disk_megapixels as f64 * 1e6).sqrt()).floor() as u32
    }

    /// Maximum decoded pixel area for uploads.
    pub fn max_input_area(&self) -> u64 {
        self.max_input_megapixels as u64 * 1_000_000
    }
}

impl Default for ConstraintsConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            max_input_megapixels: default_megapixels(),
            max_on_disk_megapixels: default_megapixels(),
        }
    }
}

/// Image-processing backend configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImagingConfig {
    /// Conversion timeout in milliseconds. Absent or zero disables the
    /// timeout. Expiry surfaces as a gateway timeout, never a generic 500.
    #[serde(default)]
    pub conversion_timeout_ms: Option<u64>,
}

impl ImagingConfig {
    pub fn conversion_timeout(&self) -> Option<Duration> {
        match self.conversion_timeout_ms {
            Some(0) | None => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

/// Durable metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

/// Object storage for published renditions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage served from a public base URL.
    Filesystem {
        /// Root directory for rendition objects.
        path: PathBuf,
        /// URL prefix under which objects in `path` are reachable.
        public_base_url: String,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain.
        secret_access_key: Option<String>,
        /// Public URL prefix for uploaded objects (CDN or bucket URL).
        public_base_url: String,
        /// Force path-style URLs. Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/renditions"),
            public_base_url: "http://localhost:1337/renditions".to_string(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Fast-tier cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FastCacheConfig {
    /// Redis connection URL. Absent means an in-process map is used.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Entry time-to-live in seconds. The fast tier is derived and
    /// best-effort, so the TTL is a latency/staleness policy knob, not a
    /// correctness contract.
    #[serde(default = "default_fast_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Key prefix, so one redis can back several deployments.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl FastCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for FastCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_fast_cache_ttl_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:1337".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_originals_dir() -> PathBuf {
    PathBuf::from("./data/originals")
}

fn default_max_upload_bytes() -> usize {
    // A camera JPEG at the default 30 MP input budget runs 5-15 MB; PNG
    // encodings of the same area can be an order of magnitude larger.
    100 * 1024 * 1024
}

fn default_max_dimension() -> u32 {
    2000
}

fn default_megapixels() -> u32 {
    30
}

fn default_max_connections() -> u32 {
    5
}

fn default_fast_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_key_prefix() -> String {
    "darkroom--".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_disk_axis_is_sqrt_of_budget() {
        let constraints = ConstraintsConfig {
            max_on_disk_megapixels: 30,
            ..ConstraintsConfig::default()
        };
        assert_eq!(constraints.max_on_disk_axis(), 5477);
    }

    #[test]
    fn zero_timeout_disables_conversion_deadline() {
        let imaging = ImagingConfig {
            conversion_timeout_ms: Some(0),
        };
        assert!(imaging.conversion_timeout().is_none());
        let imaging = ImagingConfig {
            conversion_timeout_ms: Some(4000),
        };
        assert_eq!(
            imaging.conversion_timeout(),
            Some(Duration::from_millis(4000))
        );
    }

    #[test]
    fn s3_credentials_must_be_paired() {
        let config = StorageConfig::S3 {
            bucket: "imgs".into(),
            endpoint: None,
            region: None,
            access_key_id: Some("key".into()),
            secret_access_key: None,
            public_base_url: "https://cdn.example.com".into(),
            force_path_style: false,
        };
        assert!(config.validate().is_err());
    }
}
