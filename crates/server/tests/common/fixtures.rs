//! Test fixtures for generating image payloads.

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Encode a solid-color PNG of the given dimensions.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    encode(width, height, ImageFormat::Png)
}

/// Encode a solid-color JPEG of the given dimensions.
#[allow(dead_code)]
pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    encode(width, height, ImageFormat::Jpeg)
}

/// Encode a PNG of per-pixel noise. Incompressible, so the encoded size
/// tracks the pixel area (roughly 3 bytes per pixel).
#[allow(dead_code)]
pub fn noise_png_bytes(width: u32, height: u32) -> Bytes {
    let mut seed = 0x2545_f491u32;
    let img = RgbImage::from_fn(width, height, |_, _| {
        // xorshift keeps the fixture deterministic without a rand dep.
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let [r, g, b, _] = seed.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode fixture");
    Bytes::from(buf.into_inner())
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Bytes {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 40])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode fixture");
    Bytes::from(buf.into_inner())
}

/// Build a multipart/form-data body with a single `image` file field.
#[allow(dead_code)]
pub fn multipart_image_body(boundary: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"image\"; filename=\"upload.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
