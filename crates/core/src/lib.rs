//! Shared types for the darkroom image proxy.
//!
//! This crate holds the pure data model: the canonical [`ImageRequest`],
//! the [`RenditionKey`] cache identity, and the configuration structs
//! shared across the workspace.

pub mod config;
pub mod request;

pub use config::AppConfig;
pub use request::{Blur, Fit, ImageRequest, OutputFormat, RenditionKey};

/// Token validity window in minutes.
pub const TOKEN_TTL_MINUTES: i64 = 15;

/// How far in the future rendition `Expires` headers point (years).
pub const EXPIRES_YEARS: i32 = 10;
