//! HTTP server for the darkroom image proxy.
//!
//! Serves stored originals and on-demand renditions, issues upload
//! tokens, and accepts token-gated uploads. Rendition identity lives in
//! [`darkroom_core::RenditionKey`]; this crate wires the cache tiers,
//! imaging backend, and stores behind the HTTP surface.

pub mod bounds;
pub mod cache;
pub mod error;
pub mod fastcache;
pub mod handlers;
pub mod liveness;
pub mod metrics;
pub mod params;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
