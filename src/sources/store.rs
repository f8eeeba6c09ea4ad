//! Blob stores backing local images.
//!
//! - [`LayoutDir`] reads an OCI image layout directory (`index.json`, `blobs/<alg>/<hex>`).
//! - [`ArchiveStore`] reads an image tarball (`docker save`, `podman save`, OCI archive)
//!   without unpacking it: the outer tar is indexed once and every blob is later
//!   served by seeking to its data offset. A gzip-compressed tarball is spooled to an
//!   anonymous temporary file first, since a gzip stream cannot be seeked.

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tar_rs as tar;
use tempfile::NamedTempFile;

use crate::resolver::{escapes_root, normalize_entry_path};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_LINK_HOPS: usize = 8;

/// Checks for the gzip magic without consuming any bytes.
pub(crate) fn is_gzip<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    let buf = reader.fill_buf()?;
    Ok(buf.len() >= 2 && buf[..2] == GZIP_MAGIC)
}

/// Named blobs addressed by their path relative to the image root.
pub trait BlobStore {
    fn contains(&self, name: &str) -> bool;

    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>>;

    fn read_to_string(&self, name: &str) -> Result<String> {
        let mut content = String::new();
        self.open(name)?
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read {}", name))?;
        Ok(content)
    }
}

pub struct LayoutDir {
    root: PathBuf,
}

impl LayoutDir {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(anyhow!(
                "Image layout is not a directory: {}",
                root.display()
            ));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let name = normalize_entry_path(name);
        if escapes_root(&name) {
            return None;
        }
        Some(self.root.join(name))
    }
}

impl BlobStore for LayoutDir {
    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(|path| path.is_file())
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        let path = self
            .resolve(name)
            .ok_or_else(|| anyhow!("Blob path escapes the image layout: {}", name))?;
        let file =
            File::open(&path).with_context(|| format!("Failed to open blob: {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    offset: u64,
    size: u64,
}

pub struct ArchiveStore {
    path: PathBuf,
    spans: HashMap<String, Span>,
    links: HashMap<String, String>,
    _spool: Option<NamedTempFile>,
}

impl ArchiveStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open image tarball: {}", path.display()))?;
        let mut reader = BufReader::new(file);

        if is_gzip(&mut reader).context("Failed to read magic bytes from image tarball")? {
            log::debug!("Image tarball is gzip compressed, spooling: {}", path.display());
            let mut spool = NamedTempFile::new().context("Failed to create temporary file")?;
            io::copy(&mut GzDecoder::new(reader), spool.as_file_mut())
                .with_context(|| format!("Failed to decompress {}", path.display()))?;
            let mut store = Self::index(spool.path())?;
            store._spool = Some(spool);
            return Ok(store);
        }

        Self::index(path)
    }

    fn index(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open image tarball: {}", path.display()))?;
        let mut archive = tar::Archive::new(BufReader::new(file));

        let mut spans = HashMap::new();
        let mut links = HashMap::new();

        for entry in archive
            .entries_with_seek()
            .context("Failed to read image tarball")?
        {
            let entry = entry.context("Failed to read image tarball entry")?;
            let name = normalize_entry_path(&String::from_utf8_lossy(&entry.path_bytes()));
            let entry_type = entry.header().entry_type();

            if entry_type.is_file() {
                spans.insert(
                    name,
                    Span {
                        offset: entry.raw_file_position(),
                        size: entry.size(),
                    },
                );
            } else if entry_type.is_symlink() || entry_type.is_hard_link() {
                // Older `docker save` output shares identical layers through links.
                if let Some(target) = entry.link_name_bytes() {
                    let target = String::from_utf8_lossy(&target).into_owned();
                    let resolved = if entry_type.is_symlink() && !target.starts_with('/') {
                        let parent = name.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
                        normalize_entry_path(&format!("{}/{}", parent, target))
                    } else {
                        normalize_entry_path(&target)
                    };
                    log::trace!("Image tarball link: {} -> {}", name, resolved);
                    links.insert(name, resolved);
                }
            }
        }

        log::debug!(
            "Indexed {} blobs and {} links in {}",
            spans.len(),
            links.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            spans,
            links,
            _spool: None,
        })
    }

    fn lookup(&self, name: &str) -> Option<Span> {
        let mut name = normalize_entry_path(name);
        for _ in 0..MAX_LINK_HOPS {
            if let Some(span) = self.spans.get(&name) {
                return Some(*span);
            }
            name = self.links.get(&name)?.clone();
        }
        None
    }
}

impl BlobStore for ArchiveStore {
    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn open(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        let span = self
            .lookup(name)
            .ok_or_else(|| anyhow!("Blob not found in image tarball: {}", name))?;
        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open image tarball: {}", self.path.display()))?;
        file.seek(SeekFrom::Start(span.offset))
            .with_context(|| format!("Failed to seek to blob: {}", name))?;
        Ok(Box::new(BufReader::new(file.take(span.size))))
    }
}
