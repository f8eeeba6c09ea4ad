//! Layer-reverse extraction engine.
//!
//! [`LayerWalker::extract`] walks an [`Image`]'s layers from the most recently
//! applied one down to the base, copying into a fresh `.tar.gz` the first
//! (i.e. topmost) non-empty regular copy of every requested path:
//!
//! - directories and zero-length entries are never extracted;
//! - entry paths are canonicalized (`./usr/bin/foo` == `usr/bin/foo`) and targets lose
//!   their leading `/` before comparison;
//! - once a path is claimed by a layer, deeper copies are ignored;
//! - the walk stops as soon as every distinct target is found, without opening the
//!   remaining layers.
//!
//! Failing to enumerate, open or decode a layer is fatal, and so is a layer stream
//! that ends or errors in the middle of a matched entry. Failing to write a matched
//! entry is not: the entry is skipped, recorded as an [`EntryWarning`] and the walk
//! goes on. The output archive is finalized on every exit path.
//!
//! Whiteout markers (`.wh.*`) get no special treatment; a deleted file in a lower
//! layer can still be extracted.

use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tar_rs as tar;

use crate::image::{Image, Layer};
use crate::notifier::Notifier;
use crate::plugin::{FileLocation, FileSpec};
use crate::report;
use crate::resolver::{escapes_root, normalize_entry_path, normalize_target, ResolvedSet};
use crate::sink::{carried_pax_records, OutputArchive};

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Checked before each layer is opened.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// A matched entry that could not be written to the output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryWarning {
    pub path: String,
    /// Index of the layer the entry came from, 0 being the base layer.
    pub layer: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    /// Found files in declaration order.
    pub locations: Vec<FileLocation>,
    pub warnings: Vec<EntryWarning>,
    /// Number of layers that were opened.
    pub layers_visited: usize,
    pub archive: PathBuf,
}

/// Counts the bytes a matched entry yields and remembers read failures, so
/// that source corruption is told apart from output write failures.
struct EntryReader<R> {
    inner: R,
    read: u64,
    failure: Option<String>,
}

impl<R: Read> EntryReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            read: 0,
            failure: None,
        }
    }
}

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.read += n as u64;
                Ok(n)
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::Interrupted {
                    self.failure = Some(e.to_string());
                }
                Err(e)
            }
        }
    }
}

struct WalkState {
    resolved: ResolvedSet,
    found: usize,
    warnings: Vec<EntryWarning>,
    layers_visited: usize,
}

pub struct LayerWalker<'n> {
    notifier: &'n Notifier,
    options: ExtractOptions,
}

impl<'n> LayerWalker<'n> {
    pub fn new(notifier: &'n Notifier) -> Self {
        Self {
            notifier,
            options: ExtractOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Extracts `files` from `image` into a gzip-compressed tar at `destination`.
    ///
    /// Returns the subset of `files` found in the image, in the order given.
    /// Files absent from every layer are simply left out.
    pub fn extract(
        &self,
        image: &dyn Image,
        files: &[FileSpec],
        destination: &Path,
    ) -> Result<Extraction> {
        let layers = image.layers().context("Failed to retrieve image layers")?;
        let targets: HashSet<String> = files.iter().map(|f| normalize_target(&f.from)).collect();

        self.notifier.info(&format!(
            "Looking for {} files in {} layers",
            targets.len(),
            layers.len()
        ));

        let mut sink = OutputArchive::create(destination)?;
        let mut state = WalkState {
            resolved: ResolvedSet::new(),
            found: 0,
            warnings: Vec::new(),
            layers_visited: 0,
        };

        let walked = self.walk(&layers, &targets, &mut sink, &mut state);
        let written = sink.entries();
        let finished = sink.finish().context("Failed to finalize output archive");
        walked?;
        let archive = finished?;

        self.notifier.info(&format!(
            "Wrote {} files to {} after {} of {} layers",
            written,
            archive.display(),
            state.layers_visited,
            layers.len()
        ));

        Ok(Extraction {
            locations: report::found_locations(files, &state.resolved),
            warnings: state.warnings,
            layers_visited: state.layers_visited,
            archive,
        })
    }

    fn walk<W: Write>(
        &self,
        layers: &[Box<dyn Layer + '_>],
        targets: &HashSet<String>,
        sink: &mut OutputArchive<W>,
        state: &mut WalkState,
    ) -> Result<()> {
        let progress = self.notifier.layer_progress(layers.len() as u64);

        for (index, layer) in layers.iter().enumerate().rev() {
            if state.found == targets.len() {
                self.notifier.debug(&format!(
                    "All targets resolved, skipping {} deeper layers",
                    index + 1
                ));
                break;
            }

            if self.cancelled() {
                finish_progress(&progress);
                return Err(anyhow!("Extraction cancelled before layer {}", index));
            }

            let scanned = self.walk_layer(index, layer.as_ref(), targets, sink, state);
            state.layers_visited += 1;
            if let Some(bar) = &progress {
                bar.inc(1);
            }
            if let Err(e) = scanned {
                finish_progress(&progress);
                return Err(e);
            }

            self.notifier.progress(
                state.layers_visited as u64,
                layers.len() as u64,
                "Scanned layers",
            );
        }

        finish_progress(&progress);
        Ok(())
    }

    /// One pass over a layer's entries; the layer stream is dropped (closed)
    /// on return, whatever the outcome.
    fn walk_layer<W: Write>(
        &self,
        index: usize,
        layer: &dyn Layer,
        targets: &HashSet<String>,
        sink: &mut OutputArchive<W>,
        state: &mut WalkState,
    ) -> Result<()> {
        self.notifier
            .debug(&format!("Scanning layer {} ({})", index, layer.describe()));

        let stream = layer
            .uncompressed()
            .with_context(|| format!("Failed to read layer {} contents ({})", index, layer.describe()))?;
        let mut archive = tar::Archive::new(stream);
        let entries = archive
            .entries()
            .with_context(|| format!("Failed to read tar in layer {}", index))?;

        for entry in entries {
            let mut entry = entry.with_context(|| format!("Failed to read tar entry in layer {}", index))?;

            if entry.header().entry_type().is_dir() || entry.size() == 0 {
                continue;
            }

            let path = normalize_entry_path(&String::from_utf8_lossy(&entry.path_bytes()));
            if path.is_empty()
                || escapes_root(&path)
                || state.resolved.contains(&path)
                || !targets.contains(&path)
            {
                continue;
            }

            // Claimed before writing: a deeper copy must never stand in for this one.
            state.resolved.insert(path.clone());

            let corrupt = || format!("Failed to read tar entry in layer {}", index);
            let size = entry.size();
            let pax = carried_pax_records(&mut entry).with_context(corrupt)?;
            let header = entry.header().clone();

            let mut content = EntryReader::new(&mut entry);
            let appended = sink.append(&header, &path, &pax, &mut content);

            if let Some(failure) = content.failure.take() {
                return Err(anyhow!("{}: {}", path, failure).context(corrupt()));
            }

            match appended {
                Ok(()) if content.read != size => {
                    return Err(anyhow!(
                        "{} is truncated: expected {} bytes, got {}",
                        path,
                        size,
                        content.read
                    )
                    .context(corrupt()));
                }
                Ok(()) => {
                    state.found += 1;
                    self.notifier.debug(&format!(
                        "Extracted {} ({} bytes) from layer {}",
                        path, size, index
                    ));
                }
                Err(e) => {
                    self.notifier
                        .warn(&format!("Skipping {} from layer {}: {}", path, index, e));
                    state.warnings.push(EntryWarning {
                        path,
                        layer: index,
                        message: e.to_string(),
                    });
                }
            }

            if state.found == targets.len() {
                break;
            }
        }

        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.options
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

fn finish_progress(progress: &Option<ProgressBar>) {
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
}
