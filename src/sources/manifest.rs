//! Resolves the ordered list of layer blobs of a local image.
//!
//! Two layouts are understood:
//! - `manifest.json` written by `docker save` / `podman save`: the first record's
//!   `Layers` list is used as-is (base first).
//! - OCI image layout: `index.json` → (nested indexes) → image manifest → `layers`,
//!   each descriptor mapped to `blobs/<alg>/<hex>`.
//!
//! When a [`Platform`] is requested, index descriptors are chosen by their `platform`
//! field; manifests that carry no platform (and docker-save images) are checked
//! against their image configuration instead.

use anyhow::{anyhow, Context, Result};
use oci_spec::image::{Descriptor, ImageConfiguration, ImageIndex, ImageManifest, MediaType};
use serde::Deserialize;

use super::store::BlobStore;
use crate::platform::Platform;

const DOCKER_MANIFEST: &str = "manifest.json";
const OCI_INDEX: &str = "index.json";
const MAX_INDEX_DEPTH: usize = 4;

#[derive(Debug, Deserialize)]
struct DockerManifestRecord {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags", default)]
    repo_tags: Option<Vec<String>>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Returns the layer blob names, base layer first.
pub fn resolve_layers(store: &dyn BlobStore, platform: Option<&Platform>) -> Result<Vec<String>> {
    if store.contains(DOCKER_MANIFEST) {
        docker_layers(store, platform).context("Failed to read manifest.json")
    } else if store.contains(OCI_INDEX) {
        oci_layers(store, platform).context("Failed to read index.json")
    } else {
        Err(anyhow!(
            "Invalid image: neither manifest.json nor index.json found. This does not appear to be a valid OCI/Docker image."
        ))
    }
}

fn docker_layers(store: &dyn BlobStore, platform: Option<&Platform>) -> Result<Vec<String>> {
    let records: Vec<DockerManifestRecord> =
        serde_json::from_str(&store.read_to_string(DOCKER_MANIFEST)?)
            .context("Failed to parse manifest.json")?;

    let record = records
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty manifest.json"))?;

    log::debug!(
        "docker-save manifest: tags {:?}, {} layers",
        record.repo_tags.unwrap_or_default(),
        record.layers.len()
    );

    if let Some(platform) = platform {
        let config = read_config(store, &record.config)?;
        if !platform.matches_config(&config) {
            return Err(anyhow!(
                "Image is built for {}/{}, not {}",
                config.os(),
                config.architecture(),
                platform
            ));
        }
    }

    for layer in &record.layers {
        if !store.contains(layer) {
            return Err(anyhow!("Layer blob not found: {}", layer));
        }
    }

    Ok(record.layers)
}

fn oci_layers(store: &dyn BlobStore, platform: Option<&Platform>) -> Result<Vec<String>> {
    let index = ImageIndex::from_reader(store.open(OCI_INDEX)?)
        .context("Failed to parse image index")?;

    let manifest = select_manifest(store, &index, platform, 0)?.ok_or_else(|| match platform {
        Some(p) => anyhow!("No manifest for platform {} in image index", p),
        None => anyhow!("Image index lists no manifests"),
    })?;

    manifest
        .layers()
        .iter()
        .map(|layer| {
            let name = blob_name(layer)?;
            if !store.contains(&name) {
                return Err(anyhow!("Layer blob not found: {}", name));
            }
            Ok(name)
        })
        .collect()
}

fn select_manifest(
    store: &dyn BlobStore,
    index: &ImageIndex,
    platform: Option<&Platform>,
    depth: usize,
) -> Result<Option<ImageManifest>> {
    if depth > MAX_INDEX_DEPTH {
        return Err(anyhow!("Image index nesting is too deep"));
    }

    for descriptor in index.manifests() {
        let name = blob_name(descriptor)?;

        if *descriptor.media_type() == MediaType::ImageIndex {
            let nested = ImageIndex::from_reader(store.open(&name)?)
                .with_context(|| format!("Failed to parse nested image index {}", name))?;
            if let Some(manifest) = select_manifest(store, &nested, platform, depth + 1)? {
                return Ok(Some(manifest));
            }
            continue;
        }

        if let (Some(wanted), Some(offered)) = (platform, descriptor.platform()) {
            if !wanted.matches(offered) {
                log::trace!("Skipping manifest {} for platform {:?}", name, offered);
                continue;
            }
        }

        let manifest = ImageManifest::from_reader(store.open(&name)?)
            .with_context(|| format!("Failed to parse image manifest {}", name))?;

        if let (Some(wanted), None) = (platform, descriptor.platform()) {
            let config = read_config(store, &blob_name(manifest.config())?)?;
            if !wanted.matches_config(&config) {
                continue;
            }
        }

        log::debug!("Selected image manifest {}", descriptor.digest());
        return Ok(Some(manifest));
    }

    Ok(None)
}

fn read_config(store: &dyn BlobStore, name: &str) -> Result<ImageConfiguration> {
    ImageConfiguration::from_reader(store.open(name)?)
        .with_context(|| format!("Failed to parse image configuration {}", name))
}

fn blob_name(descriptor: &Descriptor) -> Result<String> {
    let digest = descriptor.digest().to_string();
    let (algorithm, hex) = digest
        .split_once(':')
        .ok_or_else(|| anyhow!("Malformed digest: {}", digest))?;
    Ok(format!("blobs/{}/{}", algorithm, hex))
}
