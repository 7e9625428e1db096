//! Output dimension bounds.
//!
//! Requests over the configured maxima are never generated as asked;
//! they are clamped and answered with a redirect to the canonical clamped
//! URL, so the cache only ever holds in-bounds renditions.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use darkroom_core::request::Fit;
use darkroom_imaging::{Dimensions, ImagingError};
use tracing::debug;

/// Result of clamping a requested box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clamped {
    pub width: u32,
    pub height: u32,
    pub clamped: bool,
}

/// Clamp a requested box to the configured maxima.
///
/// Crop keeps the requested aspect ratio (the crop window is the whole
/// point of the request); other fits clamp each axis independently, since
/// they preserve the source ratio themselves. Idempotent.
pub fn clamp(width: u32, height: u32, fit: Fit, max_width: u32, max_height: u32) -> Clamped {
    let (mut w, mut h) = (width as f64, height as f64);
    let (max_w, max_h) = (max_width as f64, max_height as f64);

    if fit == Fit::Crop {
        if w > max_w {
            h = (h * max_w / w).round();
            w = max_w;
        }
        if h > max_h {
            w = (w * max_h / h).round();
            h = max_h;
        }
    } else {
        w = w.min(max_w);
        h = h.min(max_h);
    }

    let result = Clamped {
        width: (w as u32).max(1),
        height: (h as u32).max(1),
        clamped: false,
    };
    Clamped {
        clamped: result.width != width || result.height != height,
        ..result
    }
}

/// Natural dimensions of a stored original, memoized in the fast tier.
pub async fn natural_size(state: &AppState, name: &str) -> ApiResult<Dimensions> {
    let cache_key = state.size_cache_key(name);
    if let Some(cached) = state.fast.get(&cache_key).await
        && let Some(dims) = parse_size(&cached)
    {
        return Ok(dims);
    }

    let path = state.originals.path(name)?;
    let dims = state.imaging.dimensions(&path).await.map_err(|err| {
        match err {
            ImagingError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ApiError::NotFound(format!("image not found: {name}"))
            }
            other => other.into(),
        }
    })?;

    debug!(name = %name, width = dims.width, height = dims.height, "resolved natural size");
    seed_size_cache(state, name, dims).await;
    Ok(dims)
}

/// Write a source's natural size into the fast tier.
pub async fn seed_size_cache(state: &AppState, name: &str, dims: Dimensions) {
    let cache_key = state.size_cache_key(name);
    let value = format!("{}x{}", dims.width, dims.height);
    state
        .fast
        .set(&cache_key, &value, state.config.fast_cache.ttl())
        .await;
}

fn parse_size(value: &str) -> Option<Dimensions> {
    let (w, h) = value.split_once('x')?;
    Some(Dimensions {
        width: w.parse().ok()?,
        height: h.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_bounds_requests_pass_through() {
        let c = clamp(800, 600, Fit::Clip, 2000, 2000);
        assert_eq!(
            c,
            Clamped {
                width: 800,
                height: 600,
                clamped: false
            }
        );
    }

    #[test]
    fn clip_clamps_each_axis_independently() {
        let c = clamp(4000, 600, Fit::Clip, 2000, 2000);
        assert_eq!((c.width, c.height, c.clamped), (2000, 600, true));
        let c = clamp(4000, 3000, Fit::Canvas, 2000, 2000);
        assert_eq!((c.width, c.height), (2000, 2000));
    }

    #[test]
    fn crop_preserves_the_requested_aspect_ratio() {
        let c = clamp(4000, 2000, Fit::Crop, 2000, 2000);
        assert_eq!((c.width, c.height, c.clamped), (2000, 1000, true));
    }

    #[test]
    fn crop_clamp_handles_both_axes_over() {
        let c = clamp(8000, 4000, Fit::Crop, 2000, 1000);
        assert_eq!((c.width, c.height), (2000, 1000));
    }

    #[test]
    fn clamping_is_idempotent() {
        let first = clamp(5000, 3000, Fit::Crop, 2000, 2000);
        let again = clamp(first.width, first.height, Fit::Crop, 2000, 2000);
        assert!(!again.clamped);
        assert_eq!((again.width, again.height), (first.width, first.height));
    }

    #[test]
    fn size_cache_values_round_trip() {
        let dims = parse_size("1920x1080").unwrap();
        assert_eq!((dims.width, dims.height), (1920, 1080));
        assert!(parse_size("garbage").is_none());
    }
}
