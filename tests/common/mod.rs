//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use oci2plugin::{Image, Layer};
use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::rc::Rc;
use tar_rs as tar;

pub enum Entry {
    Dir(&'static str),
    File(&'static str, &'static [u8]),
    Symlink(&'static str, &'static str),
}

/// Builds an uncompressed layer tar. Names are written verbatim, so `./` and
/// trailing slashes are kept as given.
pub fn layer_tar(entries: &[Entry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        let (path, content): (&str, &[u8]) = match entry {
            Entry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                (*path, &[][..])
            }
            Entry::File(path, content) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o755);
                (*path, *content)
            }
            Entry::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_link_name(target).unwrap();
                (*path, &[][..])
            }
        };
        header.as_old_mut().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_uid(1000);
        header.set_gid(1000);
        header.set_mtime(1_700_000_000);
        header.set_size(content.len() as u64);
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// A layer holding one regular file whose header declares `declared` bytes
/// but whose stream ends after `content`.
pub fn truncated_layer(path: &str, declared: u64, content: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    header.as_old_mut().name[..path.len()].copy_from_slice(path.as_bytes());
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o755);
    header.set_size(declared);
    header.set_cksum();

    let mut data = header.as_bytes().to_vec();
    data.extend_from_slice(content);
    data
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Decodes an output archive into `(path, content, mode)` triples.
pub fn read_output(path: &Path) -> Vec<(String, Vec<u8>, u32)> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|e| {
            let mut e = e.unwrap();
            let name = e.path().unwrap().to_string_lossy().into_owned();
            let mode = e.header().mode().unwrap();
            let mut data = Vec::new();
            e.read_to_end(&mut data).unwrap();
            (name, data, mode)
        })
        .collect()
}

pub enum FakeLayer {
    Tar(Vec<u8>),
    /// Opening the stream fails.
    Unreadable,
    /// Opens fine but the content is not a tar archive.
    Corrupt,
    /// Yields these bytes, then every read fails.
    FailsAfter(Vec<u8>),
}

struct FailingTail<'a> {
    data: &'a [u8],
}

impl Read for FailingTail<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "connection reset"));
        }
        self.data.read(buf)
    }
}

/// In-memory image that counts how often each layer stream is opened.
pub struct FakeImage {
    layers: Vec<FakeLayer>,
    opened: Vec<Rc<Cell<usize>>>,
}

impl FakeImage {
    /// `layers` are given base first.
    pub fn new(layers: Vec<FakeLayer>) -> Self {
        let opened = layers.iter().map(|_| Rc::new(Cell::new(0))).collect();
        Self { layers, opened }
    }

    pub fn opened(&self, index: usize) -> usize {
        self.opened[index].get()
    }
}

struct FakeLayerHandle<'a> {
    index: usize,
    layer: &'a FakeLayer,
    opened: &'a Cell<usize>,
}

impl Layer for FakeLayerHandle<'_> {
    fn describe(&self) -> String {
        format!("fake-{}", self.index)
    }

    fn uncompressed(&self) -> Result<Box<dyn Read + '_>> {
        self.opened.set(self.opened.get() + 1);
        match self.layer {
            FakeLayer::Tar(data) => Ok(Box::new(&data[..])),
            FakeLayer::Unreadable => Err(anyhow!("blob unavailable")),
            FakeLayer::Corrupt => Ok(Box::new(&[0xffu8; 1024][..])),
            FakeLayer::FailsAfter(data) => Ok(Box::new(FailingTail { data })),
        }
    }
}

impl Image for FakeImage {
    fn layers(&self) -> Result<Vec<Box<dyn Layer + '_>>> {
        Ok(self
            .layers
            .iter()
            .zip(&self.opened)
            .enumerate()
            .map(|(index, (layer, opened))| {
                Box::new(FakeLayerHandle {
                    index,
                    layer,
                    opened: opened.as_ref(),
                }) as Box<dyn Layer + '_>
            })
            .collect())
    }
}

/// Image whose manifest cannot be read.
pub struct BrokenImage;

impl Image for BrokenImage {
    fn layers(&self) -> Result<Vec<Box<dyn Layer + '_>>> {
        Err(anyhow!("manifest unknown"))
    }
}

/// Writes `content` as `blobs/sha256/<hex>` under `root`; returns the digest.
/// The digest is a fake derived from `tag`, stores never verify it.
pub fn write_blob(root: &Path, tag: char, content: &[u8]) -> String {
    let hex: String = std::iter::repeat(tag).take(64).collect();
    fs::create_dir_all(root.join("blobs/sha256")).unwrap();
    fs::write(root.join("blobs/sha256").join(&hex), content).unwrap();
    format!("sha256:{}", hex)
}
