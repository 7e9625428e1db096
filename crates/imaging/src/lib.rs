//! Image decoding, transformation, and encoding.
//!
//! Renders are planned as pure op lists ([`plan`]) and executed by an
//! [`ImageBackend`]. The stock backend is [`ImageProcessor`], built on the
//! `image` crate.

pub mod backend;
pub mod error;
pub mod plan;
pub mod processor;

pub use backend::{Dimensions, ImageBackend, NormalizedUpload, UploadCrop, UploadLimits};
pub use error::{ImagingError, ImagingResult};
pub use plan::{CanvasFill, ImageOp, RenderTarget, plan};
pub use processor::ImageProcessor;
