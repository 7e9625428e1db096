//! Upload token repository.

use crate::error::MetadataResult;
use crate::models::TokenRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for the one-shot upload token state machine.
#[async_trait]
pub trait TokenRepo: Send + Sync {
    /// Issue a token for an image_id, valid for 15 minutes.
    ///
    /// Expired-and-unused rows for the same image_id are purged first, so
    /// only a genuinely live token blocks re-issue. Fails with
    /// `AlreadyExists` if the image_id slot is taken (live token, or an
    /// upload that already completed).
    async fn create_token(&self, token_id: Uuid, image_id: &str) -> MetadataResult<()>;

    /// Atomically consume a token: succeeds only if the row matches
    /// `(token_id, image_id)`, is unused, and unexpired. Concurrent callers
    /// race safely to exactly one winner.
    async fn consume_token(&self, token_id: Uuid, image_id: &str) -> MetadataResult<bool>;

    /// Record upload completion on a consumed-unfinished row. Idempotent:
    /// returns false without mutation if no such row matches.
    async fn mark_completed(&self, token_id: Uuid, image_id: &str) -> MetadataResult<bool>;

    /// Delete the unfinished token row for an image_id so a fresh create
    /// can succeed. Returns the number of rows released.
    async fn release_token(&self, image_id: &str) -> MetadataResult<u64>;

    /// Delete expired-and-unused rows. Returns the number swept.
    async fn cleanup_expired(&self) -> MetadataResult<u64>;

    /// Fetch a token row by id.
    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>>;
}
