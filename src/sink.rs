//! Streaming `.tar.gz` writer for extracted entries.
//!
//! The tar builder owns the gzip encoder, which owns the file, so both the
//! explicit [`OutputArchive::finish`] and an implicit drop close them inner to
//! outer: tar trailer, then gzip trailer, then the file. Whatever was appended
//! before a failure stays readable.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar_rs as tar;

/// PAX records that must not follow an entry into the output: the entry is
/// stored under its normalized path.
const DROPPED_PAX_KEYS: &[&str] = &["path", "linkpath"];

/// Extended (PAX) records of a source entry, minus the ones that would
/// override the stored name.
pub fn carried_pax_records<R: Read>(
    entry: &mut tar::Entry<'_, R>,
) -> io::Result<Vec<(String, Vec<u8>)>> {
    let mut records = Vec::new();
    if let Some(extensions) = entry.pax_extensions()? {
        for extension in extensions {
            let extension = extension?;
            let Ok(key) = extension.key() else {
                continue;
            };
            if DROPPED_PAX_KEYS.contains(&key) {
                continue;
            }
            records.push((key.to_string(), extension.value_bytes().to_vec()));
        }
    }
    Ok(records)
}

/// A tar stream under construction. `W` is what the tar layer writes into;
/// [`OutputArchive::create`] makes it a gzip encoder over a fresh file.
pub struct OutputArchive<W: Write = GzEncoder<File>> {
    builder: tar::Builder<W>,
    path: PathBuf,
    entries: usize,
}

impl OutputArchive {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create output archive: {}", path.display()))?;
        let encoder = GzEncoder::new(file, Compression::default());

        Ok(Self::new(encoder, path))
    }

    pub fn finish(self) -> Result<PathBuf> {
        let path = self.path.clone();
        let encoder = self.into_inner()?;
        let file = encoder
            .finish()
            .with_context(|| format!("Failed to finish gzip stream: {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to flush output archive: {}", path.display()))?;
        Ok(path)
    }
}

impl<W: Write> OutputArchive<W> {
    /// `path` only labels the archive in messages.
    pub fn new(writer: W, path: &Path) -> Self {
        Self {
            builder: tar::Builder::new(writer),
            path: path.to_path_buf(),
            entries: 0,
        }
    }

    /// Appends one entry, keeping the source header's metadata and PAX
    /// records but storing it under `path`. `content` should yield exactly
    /// `header.size()` bytes; checking that is up to the caller.
    pub fn append<R: Read>(
        &mut self,
        header: &tar::Header,
        path: &str,
        pax: &[(String, Vec<u8>)],
        content: R,
    ) -> io::Result<()> {
        if !pax.is_empty() {
            self.builder
                .append_pax_extensions(pax.iter().map(|(k, v)| (k.as_str(), v.as_slice())))?;
        }
        let mut header = header.clone();
        self.builder.append_data(&mut header, path, content)?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the tar trailer and hands back the inner writer.
    pub fn into_inner(self) -> Result<W> {
        let path = self.path;
        self.builder
            .into_inner()
            .with_context(|| format!("Failed to write tar trailer: {}", path.display()))
    }
}
