//! Durable metadata store for darkroom.
//!
//! The durable tier is authoritative: it exclusively owns rendition cache
//! rows and upload tokens. Two implementations are provided behind the
//! [`MetadataStore`] trait: PostgreSQL for deployments and SQLite for tests
//! and small installs.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use repos::{RenditionRepo, StoreOutcome, TokenRepo};
pub use store::{MetadataStore, SqliteStore};

use darkroom_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
        MetadataConfig::Postgres {
            url,
            max_connections,
        } => {
            let store = PostgresStore::new(url, *max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}
