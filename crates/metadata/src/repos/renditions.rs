//! Rendition cache repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use darkroom_core::RenditionKey;
use time::OffsetDateTime;

/// Outcome of a rendition insert.
///
/// `Deduplicated` means a concurrent generation for the identical key
/// committed first. Both renditions are valid and the already-cached row
/// wins; this is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    Deduplicated,
}

/// Repository for the durable rendition cache.
#[async_trait]
pub trait RenditionRepo: Send + Sync {
    /// Look up the published URL for a rendition key.
    async fn find_rendition(&self, key: &RenditionKey) -> MetadataResult<Option<String>>;

    /// Insert-or-ignore a rendition row, branching on a structured outcome
    /// rather than error text.
    async fn insert_rendition(
        &self,
        key: &RenditionKey,
        url: &str,
        rendered_at: OffsetDateTime,
    ) -> MetadataResult<StoreOutcome>;
}
