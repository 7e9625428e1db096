//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One-shot upload token.
///
/// Lifecycle: issued (`used = false`) → consumed (`used = true`,
/// `uploaded_at` null) → completed (`uploaded_at` set). Expired unused rows
/// are swept; abandoned consumed rows are deleted so the image_id slot can
/// be re-issued.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub id: Uuid,
    pub image_id: String,
    pub valid_until: OffsetDateTime,
    pub used: bool,
    pub uploaded_at: Option<OffsetDateTime>,
}
