//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::TokenRow;
use crate::repos::{RenditionRepo, StoreOutcome, TokenRepo};
use crate::store::{MetadataStore, schema_statements, sql, token_deadline};
use async_trait::async_trait;
use darkroom_core::RenditionKey;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect to PostgreSQL and run migrations.
    pub async fn new(url: &str, max_connections: u32) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared
        // statement, so execute the schema statement by statement.
        for statement in schema_statements(POSTGRES_SCHEMA) {
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
impl RenditionRepo for PostgresStore {
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
impl TokenRepo for PostgresStore {
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
