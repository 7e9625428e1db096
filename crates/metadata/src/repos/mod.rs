//! Repository traits for the metadata store.

pub mod renditions;
pub mod tokens;

pub use renditions::{RenditionRepo, StoreOutcome};
pub use tokens::TokenRepo;
