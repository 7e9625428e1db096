//! The `image`-crate render backend.
//!
//! Decoding and pixel work run on the blocking pool, optionally under the
//! configured conversion deadline. EXIF orientation is read from the raw
//! bytes with `kamadak-exif` since decoders do not surface it.

use crate::backend::{Dimensions, ImageBackend, NormalizedUpload, UploadCrop, UploadLimits};
use crate::error::{ImagingError, ImagingResult};
use crate::plan::{CanvasFill, ImageOp, RenderTarget, center_offset, cover_dimensions, plan};
use async_trait::async_trait;
use bytes::Bytes;
use darkroom_core::config::ImagingConfig;
use darkroom_core::request::{OutputFormat, QUALITY_AUTO};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageFormat, ImageReader, Rgba, RgbaImage, imageops};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Render backend built on the `image` crate.
#[derive(Clone, Debug, Default)]
pub struct ImageProcessor {
    timeout: Option<Duration>,
}

impl ImageProcessor {
    pub fn new(config: &ImagingConfig) -> Self {
        Self {
            timeout: config.conversion_timeout(),
        }
    }

    /// Run pixel work on the blocking pool under the conversion deadline.
    async fn convert<T, F>(&self, work: F) -> ImagingResult<T>
    where
        F: FnOnce() -> ImagingResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);
        let joined = match self.timeout {
            Some(deadline) => tokio::time::timeout(deadline, task)
                .await
                .map_err(|_| ImagingError::Timeout)?,
            None => task.await,
        };
        joined.map_err(|err| ImagingError::Join(err.to_string()))?
    }
}

#[async_trait]
impl ImageBackend for ImageProcessor {
    async fn dimensions(&self, path: &Path) -> ImagingResult<Dimensions> {
        let path: PathBuf = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || -> ImagingResult<Dimensions> {
            let (width, height) = ImageReader::open(&path)?
                .with_guessed_format()?
                .into_dimensions()?;
            Ok(Dimensions { width, height })
        });
        task.await
            .map_err(|err| ImagingError::Join(err.to_string()))?
    }

    async fn render(&self, source: Bytes, target: RenderTarget) -> ImagingResult<Bytes> {
        self.convert(move || render_blocking(&source, target).map(Bytes::from))
            .await
    }

    async fn normalize_upload(
        &self,
        source: Bytes,
        crop: Option<UploadCrop>,
        limits: UploadLimits,
    ) -> ImagingResult<NormalizedUpload> {
        self.convert(move || normalize_blocking(&source, crop, limits))
            .await
    }
}

fn render_blocking(source: &[u8], target: RenderTarget) -> ImagingResult<Vec<u8>> {
    let mut img = image::load_from_memory(source)?;
    let mut quality = QUALITY_AUTO;

    for op in plan(&target) {
        match op {
            // Re-encoding from decoded pixels drops source metadata.
            ImageOp::Strip => {}
            ImageOp::ResizeFit { width, height } => {
                img = img.resize(width, height, FilterType::Lanczos3);
            }
            ImageOp::ResizeCover { width, height } => {
                let (w, h) = cover_dimensions(img.width(), img.height(), width, height);
                img = img.resize_exact(w, h, FilterType::Lanczos3);
            }
            ImageOp::CropCenter { width, height } => {
                let w = width.min(img.width());
                let h = height.min(img.height());
                let x = center_offset(img.width(), w);
                let y = center_offset(img.height(), h);
                img = img.crop_imm(x, y, w, h);
            }
            ImageOp::ExtendCanvas {
                width,
                height,
                fill,
            } => {
                img = extend_canvas(img, width, height, fill);
            }
            ImageOp::FlattenBackground => {
                img = flatten_onto_white(img);
            }
            ImageOp::Blur { sigma } => {
                img = img.blur(sigma);
            }
            ImageOp::Quality(q) => quality = q,
            // Baseline output; interlacing stays an encoder hint.
            ImageOp::Interlace => {}
        }
    }

    encode(&img, target.format, quality)
}

fn extend_canvas(img: DynamicImage, width: u32, height: u32, fill: CanvasFill) -> DynamicImage {
    let pixel = match fill {
        CanvasFill::White => Rgba([255, 255, 255, 255]),
        CanvasFill::Transparent => Rgba([0, 0, 0, 0]),
    };
    let mut canvas = RgbaImage::from_pixel(width, height, pixel);
    let x = center_offset(width, img.width().min(width)) as i64;
    let y = center_offset(height, img.height().min(height)) as i64;
    imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
    DynamicImage::ImageRgba8(canvas)
}

fn flatten_onto_white(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }
    let mut canvas = RgbaImage::from_pixel(img.width(), img.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas)
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: i32) -> ImagingResult<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let mut cursor = Cursor::new(&mut buf);
            if quality == QUALITY_AUTO {
                JpegEncoder::new(&mut cursor).encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )?;
            } else {
                JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100) as u8).encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )?;
            }
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        OutputFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)?;
        }
    }
    Ok(buf)
}

fn normalize_blocking(
    source: &[u8],
    crop: Option<UploadCrop>,
    limits: UploadLimits,
) -> ImagingResult<NormalizedUpload> {
    let reader = ImageReader::new(Cursor::new(source)).with_guessed_format()?;
    let format = reader.format().ok_or(ImagingError::UnrecognizedFormat)?;
    let (width, height) = reader.into_dimensions()?;

    // Admission check on header dimensions, before the full decode.
    let area = width as u64 * height as u64;
    if area > limits.max_area {
        return Err(ImagingError::TooLarge {
            area,
            max: limits.max_area,
        });
    }

    let mut img = ImageReader::new(Cursor::new(source))
        .with_guessed_format()?
        .decode()?;
    let mut modified = false;

    // Crop runs before orientation so the window is interpreted in the
    // same coordinate space the client measured it in.
    if let Some(window) = crop {
        let w = window.width.min(img.width().saturating_sub(window.x));
        let h = window.height.min(img.height().saturating_sub(window.y));
        if w == 0 || h == 0 {
            warn!(
                x = window.x,
                y = window.y,
                "crop window outside image bounds, ignoring"
            );
        } else {
            img = img.crop_imm(window.x, window.y, w, h);
            modified = true;
        }
    }

    let orientation = read_orientation(source);
    if orientation != 1 {
        img = apply_orientation(img, orientation);
        modified = true;
    }

    if img.width().max(img.height()) > limits.max_axis {
        img = img.resize(limits.max_axis, limits.max_axis, FilterType::Lanczos3);
        modified = true;
    }

    // Untouched uploads keep their original bytes, avoiding a lossy
    // re-encode.
    if !modified {
        return Ok(NormalizedUpload {
            bytes: source.to_vec(),
            width: img.width(),
            height: img.height(),
        });
    }

    let out_format = if format.can_write() {
        format
    } else {
        ImageFormat::Png
    };
    let img = if matches!(out_format, ImageFormat::Jpeg) {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), out_format)?;

    Ok(NormalizedUpload {
        width: img.width(),
        height: img.height(),
        bytes: buf,
    })
}

/// EXIF orientation tag, 1 when absent or unreadable.
fn read_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(data) => data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    }
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
