//! Request path and query resolution.
//!
//! Image routes cannot be expressed as axum path patterns (the dimensions
//! and extension are packed into one segment), so the fallback handler
//! hands the raw path to this module. Resolution is pure and synchronous.
//!
//! Grammar:
//! - `/{name}_{width}_{height}_{scale}x.{format}`
//! - `/{name}_{width}_{height}.{format}`
//! - `/{name}.{format}`

use crate::error::ApiError;
use darkroom_core::request::{Blur, Fit, ImageRequest, OutputFormat, QUALITY_AUTO};
use darkroom_imaging::UploadCrop;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static RESIZABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?<name>.+)_(?<width>\d+)_(?<height>\d+)(?:_(?<scale>\d+)x)?\.(?<ext>[A-Za-z0-9]+)$")
        .expect("resizable route regex")
});

static ORIGINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?<name>.+)\.(?<ext>[A-Za-z0-9]+)$").expect("original route regex")
});

/// Raw query parameters accepted on image routes.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryParams {
    pub fit: Option<String>,
    pub blur: Option<String>,
    pub quality: Option<String>,
    // Upload-time crop window.
    pub x: Option<String>,
    pub y: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

impl QueryParams {
    /// Whether any pixel-affecting filter is present. Turns the
    /// `/{name}.{format}` route into a rendition request instead of an
    /// original serve.
    pub fn has_filters(&self) -> bool {
        self.fit.is_some() || self.blur.is_some() || self.quality.is_some()
    }
}

/// Resolution failures, mapped to the API taxonomy by the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The path does not look like an image route at all.
    NotAnImagePath,
    UnsupportedFormat(String),
    InvalidRequest(String),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotAnImagePath => ApiError::NotFound("no such route".to_string()),
            ResolveError::UnsupportedFormat(ext) => {
                ApiError::UnsupportedMediaType(format!("unsupported output format: {ext}"))
            }
            ResolveError::InvalidRequest(msg) => ApiError::InvalidRequest(msg),
        }
    }
}

/// Resolve a request path plus query into a canonical [`ImageRequest`].
pub fn resolve(path: &str, query: &QueryParams) -> Result<ImageRequest, ResolveError> {
    let (name, ext, dimensions) = if let Some(caps) = RESIZABLE.captures(path) {
        let width = parse_dimension(&caps["width"])?;
        let height = parse_dimension(&caps["height"])?;
        let scale = match caps.name("scale") {
            Some(scale) => parse_dimension(scale.as_str())?,
            None => 1,
        };
        let width = width
            .checked_mul(scale)
            .ok_or_else(|| ResolveError::InvalidRequest("dimensions out of range".to_string()))?;
        let height = height
            .checked_mul(scale)
            .ok_or_else(|| ResolveError::InvalidRequest("dimensions out of range".to_string()))?;
        (
            caps["name"].to_string(),
            caps["ext"].to_string(),
            Some((width, height)),
        )
    } else if let Some(caps) = ORIGINAL.captures(path) {
        (caps["name"].to_string(), caps["ext"].to_string(), None)
    } else {
        return Err(ResolveError::NotAnImagePath);
    };

    if name.is_empty() {
        return Err(ResolveError::InvalidRequest("missing image name".to_string()));
    }

    let format =
        OutputFormat::from_extension(&ext).ok_or(ResolveError::UnsupportedFormat(ext))?;

    let fit = Fit::from_param(query.fit.as_deref());

    // Quality only means something for lossy encodings; it stays auto
    // everywhere else so the cache key is not fragmented.
    let quality = if format.supports_quality() {
        query
            .quality
            .as_deref()
            .and_then(|q| q.parse::<i32>().ok())
            .unwrap_or(QUALITY_AUTO)
    } else {
        QUALITY_AUTO
    };

    let blur = if query.blur.as_deref() == Some("true") {
        Some(Blur::default())
    } else {
        None
    };

    Ok(ImageRequest {
        name,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
        fit,
        format,
        quality,
        blur,
    })
}

/// Extract the image name from an upload path (`/{name}.{format}` or
/// `/{name}`).
pub fn upload_name(path: &str) -> Result<String, ResolveError> {
    let name = if let Some(caps) = ORIGINAL.captures(path) {
        match OutputFormat::from_extension(&caps["ext"]) {
            // A known image extension is decoration, not part of the name.
            Some(_) => caps["name"].to_string(),
            None => path.trim_start_matches('/').to_string(),
        }
    } else {
        path.trim_start_matches('/').to_string()
    };

    if name.is_empty() {
        return Err(ResolveError::InvalidRequest("missing image name".to_string()));
    }
    Ok(name)
}

/// Parse the upload crop window. Any missing or unparsable member disables
/// the crop entirely.
pub fn upload_crop(query: &QueryParams) -> Option<UploadCrop> {
    Some(UploadCrop {
        x: parse_crop_member(query.x.as_deref()?)?,
        y: parse_crop_member(query.y.as_deref()?)?,
        width: parse_crop_member(query.width.as_deref()?)?,
        height: parse_crop_member(query.height.as_deref()?)?,
    })
}

fn parse_crop_member(value: &str) -> Option<u32> {
    // Truncating, non-negative.
    let parsed = value.parse::<f64>().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some(parsed.trunc() as u32)
}

fn parse_dimension(value: &str) -> Result<u32, ResolveError> {
    let parsed = value
        .parse::<u32>()
        .map_err(|_| ResolveError::InvalidRequest("dimensions out of range".to_string()))?;
    if parsed == 0 {
        return Err(ResolveError::InvalidRequest(
            "dimensions must be positive".to_string(),
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resizable_route_parses_dimensions() {
        let req = resolve("/cat_800_600.jpg", &QueryParams::default()).unwrap();
        assert_eq!(req.name, "cat");
        assert_eq!((req.width, req.height), (Some(800), Some(600)));
        assert_eq!(req.format, OutputFormat::Jpeg);
        assert_eq!(req.fit, Fit::Clip);
        assert_eq!(req.quality, QUALITY_AUTO);
    }

    #[test]
    fn scale_multiplies_both_dimensions() {
        let req = resolve("/cat_400_300_2x.png", &QueryParams::default()).unwrap();
        assert_eq!((req.width, req.height), (Some(800), Some(600)));
    }

    #[test]
    fn underscored_names_keep_their_underscores() {
        let req = resolve("/my_cat_photo_800_600.jpg", &QueryParams::default()).unwrap();
        assert_eq!(req.name, "my_cat_photo");
    }

    #[test]
    fn original_route_has_no_dimensions() {
        let req = resolve("/cat.webp", &QueryParams::default()).unwrap();
        assert_eq!(req.name, "cat");
        assert!(req.is_original_size());
        assert_eq!(req.format, OutputFormat::Webp);
    }

    #[test]
    fn unknown_extension_is_unsupported_media() {
        assert!(matches!(
            resolve("/cat_800_600.gif", &QueryParams::default()),
            Err(ResolveError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn zero_dimensions_are_invalid() {
        assert!(matches!(
            resolve("/cat_0_600.jpg", &QueryParams::default()),
            Err(ResolveError::InvalidRequest(_))
        ));
    }

    #[test]
    fn non_image_paths_are_not_found() {
        assert_eq!(
            resolve("/favicon", &QueryParams::default()),
            Err(ResolveError::NotAnImagePath)
        );
    }

    #[test]
    fn quality_is_ignored_for_png() {
        let query = QueryParams {
            quality: Some("80".to_string()),
            ..QueryParams::default()
        };
        let req = resolve("/cat_800_600.png", &query).unwrap();
        assert_eq!(req.quality, QUALITY_AUTO);
        let req = resolve("/cat_800_600.jpg", &query).unwrap();
        assert_eq!(req.quality, 80);
    }

    #[test]
    fn blur_is_a_strict_opt_in() {
        let query = QueryParams {
            blur: Some("true".to_string()),
            ..QueryParams::default()
        };
        assert!(resolve("/cat_800_600.jpg", &query).unwrap().blur.is_some());

        let query = QueryParams {
            blur: Some("1".to_string()),
            ..QueryParams::default()
        };
        assert!(resolve("/cat_800_600.jpg", &query).unwrap().blur.is_none());
    }

    #[test]
    fn filters_flip_the_original_route_to_a_rendition() {
        let plain = QueryParams::default();
        assert!(!plain.has_filters());
        let filtered = QueryParams {
            fit: Some("crop".to_string()),
            ..QueryParams::default()
        };
        assert!(filtered.has_filters());
    }

    #[test]
    fn upload_name_strips_known_extensions_only() {
        assert_eq!(upload_name("/cat.jpg").unwrap(), "cat");
        assert_eq!(upload_name("/cat").unwrap(), "cat");
        assert_eq!(upload_name("/archive.tar").unwrap(), "archive.tar");
    }

    #[test]
    fn crop_requires_all_four_members() {
        let query = QueryParams {
            x: Some("1".to_string()),
            y: Some("2".to_string()),
            width: Some("30".to_string()),
            height: None,
            ..QueryParams::default()
        };
        assert!(upload_crop(&query).is_none());

        let query = QueryParams {
            x: Some("1.9".to_string()),
            y: Some("2".to_string()),
            width: Some("30".to_string()),
            height: Some("40".to_string()),
            ..QueryParams::default()
        };
        let crop = upload_crop(&query).unwrap();
        assert_eq!((crop.x, crop.y, crop.width, crop.height), (1, 2, 30, 40));
    }
}
