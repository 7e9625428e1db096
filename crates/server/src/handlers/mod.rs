//! HTTP request handlers.

pub mod images;
pub mod misc;
pub mod tokens;
pub mod uploads;

pub use images::image_fallback;
pub use misc::{health_check, robots_txt};
pub use tokens::create_token;
