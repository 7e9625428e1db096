//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::TokenRow;
use crate::repos::{RenditionRepo, StoreOutcome, TokenRepo};
use async_trait::async_trait;
use darkroom_core::{RenditionKey, TOKEN_TTL_MINUTES};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: RenditionRepo + TokenRepo + Send + Sync {
    /// Apply the embedded schema.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// Queries shared between the SQLite and PostgreSQL stores. Both dialects
/// accept `$N` placeholders and `ON CONFLICT DO NOTHING`; time comparisons
/// bind a caller-supplied "now" instead of relying on SQL-side clocks.
pub(crate) mod sql {
    pub const FIND_RENDITION: &str = "SELECT url FROM renditions \
         WHERE name = $1 AND width = $2 AND height = $3 AND fit = $4 \
           AND file_type = $5 AND blur = $6 AND quality = $7";

    pub const INSERT_RENDITION: &str = "INSERT INTO renditions \
         (name, width, height, fit, file_type, blur, quality, url, rendered_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (name, width, height, fit, file_type, blur, quality) DO NOTHING";

    pub const PURGE_EXPIRED_FOR_IMAGE: &str =
        "DELETE FROM tokens WHERE image_id = $1 AND used = FALSE AND valid_until < $2";

    pub const INSERT_TOKEN: &str =
        "INSERT INTO tokens (id, image_id, valid_until, used) VALUES ($1, $2, $3, FALSE)";

    pub const CONSUME_TOKEN: &str = "UPDATE tokens SET used = TRUE \
         WHERE id = $1 AND image_id = $2 AND used = FALSE AND valid_until >= $3";

    pub const MARK_COMPLETED: &str = "UPDATE tokens SET uploaded_at = $3 \
         WHERE id = $1 AND image_id = $2 AND used = TRUE AND uploaded_at IS NULL";

    pub const RELEASE_TOKEN: &str =
        "DELETE FROM tokens WHERE image_id = $1 AND uploaded_at IS NULL";

    pub const CLEANUP_EXPIRED: &str =
        "DELETE FROM tokens WHERE valid_until < $1 AND used = FALSE";

    pub const GET_TOKEN: &str = "SELECT * FROM tokens WHERE id = $1";
}

/// Token validity window.
pub(crate) fn token_deadline(now: OffsetDateTime) -> OffsetDateTime {
    now + Duration::minutes(TOKEN_TTL_MINUTES)
}

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// Split an embedded schema into individual statements; neither backend
/// accepts multiple statements in one prepared query.
pub(crate) fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// SQLite-based metadata store (testing and small deployments).
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(MetadataError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Internal(format!("filesystem error: {err}"))
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in schema_statements(SQLITE_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RenditionRepo for SqliteStore {
    async fn find_rendition(&self, key: &RenditionKey) -> MetadataResult<Option<String>> {
        let url: Option<String> = sqlx::query_scalar(sql::FIND_RENDITION)
            .bind(&key.name)
            .bind(key.width as i64)
            .bind(key.height as i64)
            .bind(key.fit.as_str())
            .bind(key.format.mime())
            .bind(key.blur)
            .bind(key.quality as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(url)
    }

    async fn insert_rendition(
        &self,
        key: &RenditionKey,
        url: &str,
        rendered_at: OffsetDateTime,
    ) -> MetadataResult<StoreOutcome> {
        let result = sqlx::query(sql::INSERT_RENDITION)
            .bind(&key.name)
            .bind(key.width as i64)
            .bind(key.height as i64)
            .bind(key.fit.as_str())
            .bind(key.format.mime())
            .bind(key.blur)
            .bind(key.quality as i64)
            .bind(url)
            .bind(rendered_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 1 {
            Ok(StoreOutcome::Created)
        } else {
            Ok(StoreOutcome::Deduplicated)
        }
    }
}

#[async_trait]
impl TokenRepo for SqliteStore {
    async fn create_token(&self, token_id: Uuid, image_id: &str) -> MetadataResult<()> {
        let now = OffsetDateTime::now_utc();
        sqlx::query(sql::PURGE_EXPIRED_FOR_IMAGE)
            .bind(image_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query(sql::INSERT_TOKEN)
            .bind(token_id)
            .bind(image_id)
            .bind(token_deadline(now))
            .execute(&self.pool)
            .await
            .map_err(MetadataError::Database);
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.is_unique_violation() => Err(MetadataError::AlreadyExists(format!(
                "image_id '{image_id}' already has a token"
            ))),
            Err(err) => Err(err),
        }
    }

    async fn consume_token(&self, token_id: Uuid, image_id: &str) -> MetadataResult<bool> {
        let result = sqlx::query(sql::CONSUME_TOKEN)
            .bind(token_id)
            .bind(image_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(&self, token_id: Uuid, image_id: &str) -> MetadataResult<bool> {
        let result = sqlx::query(sql::MARK_COMPLETED)
            .bind(token_id)
            .bind(image_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_token(&self, image_id: &str) -> MetadataResult<u64> {
        let result = sqlx::query(sql::RELEASE_TOKEN)
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn cleanup_expired(&self) -> MetadataResult<u64> {
        let result = sqlx::query(sql::CLEANUP_EXPIRED)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>(sql::GET_TOKEN)
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
