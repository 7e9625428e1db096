//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Whether the underlying database error is a uniqueness violation.
    ///
    /// Uniqueness violations carry domain meaning here: a duplicate
    /// rendition insert is a benign race, a duplicate token insert is an
    /// "already requested" rejection. Callers branch on this instead of
    /// parsing error text.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            MetadataError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
