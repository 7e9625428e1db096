//! Imaging error types.

use thiserror::Error;

/// Image decode, transform, and encode errors.
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("unrecognized image format")]
    UnrecognizedFormat,

    #[error("image too large: {area} pixels exceeds limit of {max}")]
    TooLarge { area: u64, max: u64 },

    /// The configured conversion deadline expired. Kept distinct from
    /// processing failures so callers can answer with a gateway timeout.
    #[error("image conversion timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image task failed: {0}")]
    Join(String),
}

/// Result type for imaging operations.
pub type ImagingResult<T> = std::result::Result<T, ImagingError>;
