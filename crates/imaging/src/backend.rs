//! The image backend seam.

use crate::error::ImagingResult;
use crate::plan::RenderTarget;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn longest_axis(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Client-supplied crop window applied to an upload before orientation
/// correction, in the source's stored coordinate space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadCrop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Admission and storage limits applied while normalizing an upload.
#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    /// Maximum decoded pixel area. Exceeding it rejects the upload.
    pub max_area: u64,
    /// Longest axis kept on disk. Larger sources are downscaled, never
    /// upscaled.
    pub max_axis: u32,
}

/// A normalized upload ready for the originals store.
#[derive(Clone, Debug)]
pub struct NormalizedUpload {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decoding and rendering backend.
///
/// All pixel work runs off the async runtime; implementations own their
/// own blocking-pool and deadline handling.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Read the natural dimensions of a stored original.
    async fn dimensions(&self, path: &Path) -> ImagingResult<Dimensions>;

    /// Render one rendition of the source bytes.
    async fn render(&self, source: Bytes, target: RenderTarget) -> ImagingResult<Bytes>;

    /// Validate, crop, orient, and downscale an upload for storage.
    async fn normalize_upload(
        &self,
        source: Bytes,
        crop: Option<UploadCrop>,
        limits: UploadLimits,
    ) -> ImagingResult<NormalizedUpload>;
}
