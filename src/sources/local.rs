use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::manifest;
use super::store::{is_gzip, ArchiveStore, BlobStore, LayoutDir};
use crate::image::{Image, Layer};
use crate::platform::Platform;

/// An already-fetched image on the local filesystem: either an OCI image
/// layout directory or an image tarball.
pub struct LocalImage {
    source: PathBuf,
    store: Box<dyn BlobStore>,
    layers: Vec<String>,
}

impl LocalImage {
    pub fn open<P: AsRef<Path>>(path: P, platform: Option<&Platform>) -> Result<Self> {
        let path = path.as_ref();
        let store: Box<dyn BlobStore> = if path.is_dir() {
            Box::new(LayoutDir::open(path)?)
        } else {
            Box::new(ArchiveStore::open(path)?)
        };

        let mut image = Self::from_store(store, platform)
            .with_context(|| format!("Failed to load image: {}", path.display()))?;
        image.source = path.to_path_buf();
        Ok(image)
    }

    pub fn from_store(store: Box<dyn BlobStore>, platform: Option<&Platform>) -> Result<Self> {
        let layers = manifest::resolve_layers(store.as_ref(), platform)?;
        log::debug!("Image has {} layers", layers.len());
        Ok(Self {
            source: PathBuf::new(),
            store,
            layers,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Layer blob names, base first.
    pub fn layer_names(&self) -> &[String] {
        &self.layers
    }
}

impl Image for LocalImage {
    fn layers(&self) -> Result<Vec<Box<dyn Layer + '_>>> {
        Ok(self
            .layers
            .iter()
            .map(|name| {
                Box::new(BlobLayer {
                    store: self.store.as_ref(),
                    name,
                }) as Box<dyn Layer + '_>
            })
            .collect())
    }
}

/// A layer blob; plain tar or gzip tar, told apart by magic bytes.
pub struct BlobLayer<'a> {
    store: &'a dyn BlobStore,
    name: &'a str,
}

impl Layer for BlobLayer<'_> {
    fn describe(&self) -> String {
        self.name.to_string()
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        let mut reader = BufReader::new(self.store.open(self.name)?);
        if is_gzip(&mut reader).with_context(|| format!("Failed to read layer {}", self.name))? {
            Ok(Box::new(GzDecoder::new(reader)))
        } else {
            Ok(Box::new(reader))
        }
    }
}
