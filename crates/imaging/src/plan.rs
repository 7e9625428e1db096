//! Pure transform planning.
//!
//! A render is expressed as an ordered list of [`ImageOp`]s before any
//! pixels are touched. The order is fixed: strip, geometry, background
//! flattening, blur, then the encoder hints. Geometry depends on the fit
//! mode; everything downstream operates on the already-sized canvas so a
//! blur kernel cost is bounded by the output dimensions, not the source.

use darkroom_core::request::{Blur, Fit, ImageRequest, OutputFormat, QUALITY_AUTO};

/// Fill used when a canvas extent or alpha flattening is required.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanvasFill {
    White,
    Transparent,
}

/// A single step of a render pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImageOp {
    /// Drop source metadata (EXIF, color profiles) from the output.
    Strip,
    /// Scale to fit within the box, preserving aspect ratio.
    ResizeFit { width: u32, height: u32 },
    /// Scale to fully cover the box; the result may overhang on one axis.
    ResizeCover { width: u32, height: u32 },
    /// Cut the centered window of exactly this size out of the image.
    CropCenter { width: u32, height: u32 },
    /// Extend the canvas to exactly this size, image centered.
    ExtendCanvas {
        width: u32,
        height: u32,
        fill: CanvasFill,
    },
    /// Composite transparency onto white for no-alpha targets.
    FlattenBackground,
    /// Gaussian blur with the service-wide kernel.
    Blur { sigma: f32 },
    /// Encoder quality hint. [`QUALITY_AUTO`] leaves the encoder default.
    Quality(i32),
    /// Encoder interlacing hint.
    Interlace,
}

/// Everything the renderer needs to produce one rendition: resolved
/// dimensions plus the pixel-affecting request fields.
#[derive(Clone, Copy, Debug)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub fit: Fit,
    pub format: OutputFormat,
    pub quality: i32,
    pub blur: Option<Blur>,
}

impl RenderTarget {
    /// Build a target from a request whose dimensions have been resolved
    /// and clamped by the caller.
    pub fn new(request: &ImageRequest, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fit: request.fit,
            format: request.format,
            quality: request.quality,
            blur: request.blur,
        }
    }
}

/// Produce the op sequence for a target. Pure: same target, same plan.
pub fn plan(target: &RenderTarget) -> Vec<ImageOp> {
    let RenderTarget { width, height, .. } = *target;
    let mut ops = vec![ImageOp::Strip];

    match target.fit {
        Fit::Clip => ops.push(ImageOp::ResizeFit { width, height }),
        Fit::Cover => ops.push(ImageOp::ResizeCover { width, height }),
        Fit::Crop => {
            ops.push(ImageOp::ResizeCover { width, height });
            ops.push(ImageOp::CropCenter { width, height });
        }
        Fit::Canvas => {
            ops.push(ImageOp::ResizeFit { width, height });
            ops.push(ImageOp::ExtendCanvas {
                width,
                height,
                fill: if target.format.needs_background_fill() {
                    CanvasFill::White
                } else {
                    CanvasFill::Transparent
                },
            });
        }
    }

    if target.format.needs_background_fill() {
        ops.push(ImageOp::FlattenBackground);
    }

    if let Some(blur) = target.blur {
        ops.push(ImageOp::Blur { sigma: blur.sigma });
    }

    let quality = if target.format.supports_quality() {
        target.quality
    } else {
        QUALITY_AUTO
    };
    ops.push(ImageOp::Quality(quality));

    if target.format.interlaced() {
        ops.push(ImageOp::Interlace);
    }

    ops
}

/// Dimensions after scaling a source to fully cover a target box,
/// preserving aspect ratio. At least one axis lands exactly on the box.
pub fn cover_dimensions(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let scale = f64::max(
        target_w as f64 / src_w as f64,
        target_h as f64 / src_h as f64,
    );
    let w = ((src_w as f64 * scale).round() as u32).max(target_w);
    let h = ((src_h as f64 * scale).round() as u32).max(target_h);
    (w, h)
}

/// Offset of a centered window of `target` within `scaled`.
pub fn center_offset(scaled: u32, target: u32) -> u32 {
    scaled.saturating_sub(target) / 2
}
