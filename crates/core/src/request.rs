//! Canonical image request model and the rendition cache key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed blur kernel radius. Blur is an opt-in flag, never client-tunable,
/// so a pathological kernel size cannot be requested.
pub const BLUR_RADIUS: f32 = 15.0;

/// Fixed blur kernel sigma.
pub const BLUR_SIGMA: f32 = 7.0;

/// Sentinel quality meaning "encoder default".
pub const QUALITY_AUTO: i32 = -1;

/// Strategy for reconciling the source aspect ratio with a bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Resize to fit within the box, preserving aspect ratio, no cropping.
    #[default]
    Clip,
    /// Resize to fully cover the box, then center-crop to exact dimensions.
    Crop,
    /// Clip, then pad the remainder with a centered extent to the exact box.
    Canvas,
    /// Resize to fully cover the box; may exceed it on one axis, no crop.
    Cover,
}

impl Fit {
    /// Parse a `fit` query value. Unknown values fall back to `clip`
    /// rather than erroring.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("crop") => Fit::Crop,
            Some("canvas") => Fit::Canvas,
            Some("cover") => Fit::Cover,
            _ => Fit::Clip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Fit::Clip => "clip",
            Fit::Crop => "crop",
            Fit::Canvas => "canvas",
            Fit::Cover => "cover",
        }
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported output encodings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// Map a URL extension to an output format. Unknown extensions are an
    /// unsupported media type at the boundary (415), not a fallback.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jfif" | "jpe" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Canonical extension used in cache keys and redirect URLs.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    /// Whether a numeric quality knob has an unambiguous meaning for this
    /// encoding. The same number means incompatible things across other
    /// codecs, so it is ignored there.
    pub fn supports_quality(&self) -> bool {
        matches!(self, OutputFormat::Jpeg | OutputFormat::Webp)
    }

    /// Lossy no-alpha targets need transparent sources flattened onto white,
    /// otherwise transparency renders as black.
    pub fn needs_background_fill(&self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }

    /// Interlacing only pays off for the jpeg family.
    pub fn interlaced(&self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

/// Blur parameters. Always the fixed service-wide kernel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blur {
    pub radius: f32,
    pub sigma: f32,
}

impl Default for Blur {
    fn default() -> Self {
        Self {
            radius: BLUR_RADIUS,
            sigma: BLUR_SIGMA,
        }
    }
}

/// A resolved, canonical image request.
///
/// `width`/`height` are post-scale pixel dimensions; both absent means
/// "serve the original". `quality` is [`QUALITY_AUTO`] unless the client
/// passed an explicit value for a lossy format.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRequest {
    pub name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub format: OutputFormat,
    pub quality: i32,
    pub blur: Option<Blur>,
}

impl ImageRequest {
    /// Whether this request asks for the source at its natural size.
    pub fn is_original_size(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        format!(
            "{}.{} ({}x{}px, fit: {}, blur: {}, quality: {})",
            self.name,
            self.format.extension(),
            self.width.map_or_else(|| "orig".into(), |w| w.to_string()),
            self.height.map_or_else(|| "orig".into(), |h| h.to_string()),
            self.fit,
            self.blur.is_some(),
            self.quality,
        )
    }
}

/// Deterministic identity of a rendition.
///
/// Derived from exactly the pixel-affecting request fields; two requests
/// with the same key are cache-equivalent regardless of arrival order.
/// Only constructible once both dimensions are known.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenditionKey {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fit: Fit,
    pub format: OutputFormat,
    pub blur: bool,
    pub quality: i32,
}

impl RenditionKey {
    /// Build a key from a fully-dimensioned request. Returns `None` while
    /// either dimension is unresolved (such requests redirect before ever
    /// reaching the cache).
    pub fn from_request(request: &ImageRequest) -> Option<Self> {
        Some(Self {
            name: request.name.clone(),
            width: request.width?,
            height: request.height?,
            fit: request.fit,
            format: request.format,
            blur: request.blur.is_some(),
            quality: request.quality,
        })
    }

    /// Stable string form, used as the fast-tier key suffix and as part of
    /// the published object key.
    pub fn token(&self) -> String {
        format!(
            "{}_{}x{}.{}.b-{}.q-{}.{}",
            self.name,
            self.width,
            self.height,
            self.fit,
            self.blur,
            self.quality,
            self.format.extension(),
        )
    }
}

impl fmt::Display for RenditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: Option<u32>, height: Option<u32>) -> ImageRequest {
        ImageRequest {
            name: "photo".to_string(),
            width,
            height,
            fit: Fit::Clip,
            format: OutputFormat::Jpeg,
            quality: QUALITY_AUTO,
            blur: None,
        }
    }

    #[test]
    fn unknown_fit_falls_back_to_clip() {
        assert_eq!(Fit::from_param(Some("zoom")), Fit::Clip);
        assert_eq!(Fit::from_param(None), Fit::Clip);
        assert_eq!(Fit::from_param(Some("CROP")), Fit::Crop);
    }

    #[test]
    fn jpeg_family_extensions_share_a_format() {
        for ext in ["jpg", "jpeg", "jfif", "jpe", "JPG"] {
            assert_eq!(OutputFormat::from_extension(ext), Some(OutputFormat::Jpeg));
        }
        assert_eq!(OutputFormat::from_extension("gif"), None);
        assert_eq!(OutputFormat::from_extension("tiff"), None);
    }

    #[test]
    fn key_is_stable_and_pure() {
        let req = request(Some(800), Some(600));
        let key = RenditionKey::from_request(&req).unwrap();
        assert_eq!(key.token(), "photo_800x600.clip.b-false.q--1.jpg");
        // Same fields, same key, independent of construction order.
        let again = RenditionKey::from_request(&req.clone()).unwrap();
        assert_eq!(key, again);
        assert_eq!(key.token(), again.token());
    }

    #[test]
    fn key_requires_both_dimensions() {
        assert!(RenditionKey::from_request(&request(Some(800), None)).is_none());
        assert!(RenditionKey::from_request(&request(None, None)).is_none());
    }

    #[test]
    fn blur_flag_changes_the_key() {
        let mut req = request(Some(100), Some(100));
        let plain = RenditionKey::from_request(&req).unwrap();
        req.blur = Some(Blur::default());
        let blurred = RenditionKey::from_request(&req).unwrap();
        assert_ne!(plain.token(), blurred.token());
    }
}
