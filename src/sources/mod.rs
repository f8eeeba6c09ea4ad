//! Local image sources.
//!
//! Pulling from a registry is left to the caller; these sources read images that
//! are already on disk and expose them through [`crate::image::Image`].

pub mod local;
pub mod manifest;
pub mod store;

pub use local::{BlobLayer, LocalImage};
pub use store::{ArchiveStore, BlobStore, LayoutDir};
