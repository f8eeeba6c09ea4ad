//! Plugin manifest types: the ordered list of files a plugin platform ships.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::platform::Platform;

/// A file the caller wants pulled out of the image.
///
/// `from` is the absolute path inside the image filesystem; `to` is the
/// destination label recorded for the consumer and is not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// A [`FileSpec`] proven present in the image.
pub type FileLocation = FileSpec;

impl FileSpec {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Parses the `FROM[:TO]` command line form. `TO` defaults to `.`.
    pub fn parse_flag(flag: &str) -> Result<Self> {
        let (from, to) = match flag.split_once(':') {
            Some((from, to)) => (from, to),
            None => (flag, "."),
        };
        if from.is_empty() {
            return Err(anyhow!("Invalid file '{}': source path is empty", flag));
        }
        Ok(Self::new(from, if to.is_empty() { "." } else { to }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginPlatform {
    /// `os/arch[/variant]`, empty for "whatever the image provides".
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub image: String,
    pub files: Vec<FileSpec>,
    /// Name of the plugin entrypoint, must be the basename of one of `files`.
    #[serde(default)]
    pub bin: String,
}

impl PluginPlatform {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read plugin manifest: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid plugin manifest: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let plugin: PluginPlatform =
            serde_json::from_str(content).context("Failed to parse plugin manifest")?;
        plugin.validate()?;
        Ok(plugin)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(empty) = self.files.iter().position(|f| f.from.is_empty()) {
            return Err(anyhow!("files[{}] has an empty 'from' path", empty));
        }

        if !self.bin.is_empty() {
            let shipped = self
                .files
                .iter()
                .any(|f| Path::new(&f.from).file_name().and_then(|n| n.to_str()) == Some(self.bin.as_str()));
            if !shipped {
                return Err(anyhow!(
                    "bin '{}' is not the name of any declared file",
                    self.bin
                ));
            }
        }

        self.platform()?;
        Ok(())
    }

    pub fn platform(&self) -> Result<Option<Platform>> {
        if self.platform.is_empty() {
            return Ok(None);
        }
        self.platform.parse().map(Some)
    }
}
