//! The image abstraction consumed by the extraction engine.
//!
//! An [`Image`] is an ordered sequence of [`Layer`]s, index 0 being the base
//! (oldest) layer and the last index the most recently applied one. Each layer
//! hands out a sequential stream of its uncompressed tar archive. Dropping the
//! stream closes it.

use anyhow::Result;
use std::io::Read;

pub trait Layer {
    /// Short human readable identity (digest or blob name) for logs and errors.
    fn describe(&self) -> String;

    /// Opens the layer's uncompressed tar stream. Each call yields a fresh,
    /// single-pass stream.
    fn uncompressed(&self) -> Result<Box<dyn Read + '_>>;
}

pub trait Image {
    /// Layers in application order, base first.
    fn layers(&self) -> Result<Vec<Box<dyn Layer + '_>>>;
}
