//! Target platform selection (`os/arch[/variant]`).
//!
//! A [`Platform`] is an immutable value handed to image sources per call; it is
//! matched against the `platform` field of OCI index descriptors or, for
//! single-manifest images, against the image configuration.

use anyhow::{anyhow, Result};
use oci_spec::image::{ImageConfiguration, Platform as OciPlatform};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(os: &str, architecture: &str) -> Self {
        Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant: None,
        }
    }

    /// Matches an index descriptor platform. A variant is only compared when
    /// this platform asks for one.
    pub fn matches(&self, other: &OciPlatform) -> bool {
        self.matches_parts(
            &other.os().to_string(),
            &other.architecture().to_string(),
            other.variant().as_deref(),
        )
    }

    pub fn matches_config(&self, config: &ImageConfiguration) -> bool {
        self.matches_parts(
            &config.os().to_string(),
            &config.architecture().to_string(),
            config.variant().as_deref(),
        )
    }

    fn matches_parts(&self, os: &str, architecture: &str, variant: Option<&str>) -> bool {
        if self.os != os || self.architecture != architecture {
            return false;
        }
        match &self.variant {
            Some(wanted) => variant == Some(wanted.as_str()),
            None => true,
        }
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(anyhow!("Invalid platform '{}': empty component", s));
        }
        match parts.as_slice() {
            [os, arch] => Ok(Self::new(os, arch)),
            [os, arch, variant] => Ok(Self {
                variant: Some(variant.to_string()),
                ..Self::new(os, arch)
            }),
            _ => Err(anyhow!(
                "Invalid platform '{}': expected os/arch or os/arch/variant",
                s
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oci_spec::image::{Arch, Os, PlatformBuilder};

    #[test]
    fn test_parse_platform() {
        let p: Platform = "linux/amd64".parse().unwrap();
        assert_eq!(p, Platform::new("linux", "amd64"));

        let p: Platform = "linux/arm64/v8".parse().unwrap();
        assert_eq!(p.variant.as_deref(), Some("v8"));
        assert_eq!(p.to_string(), "linux/arm64/v8");

        assert!("linux".parse::<Platform>().is_err());
        assert!("linux//amd64".parse::<Platform>().is_err());
        assert!("a/b/c/d".parse::<Platform>().is_err());
    }

    #[test]
    fn test_matches_descriptor_platform() {
        let arm = PlatformBuilder::default()
            .os(Os::Linux)
            .architecture(Arch::ARM64)
            .variant("v8".to_string())
            .build()
            .unwrap();

        assert!(Platform::new("linux", "arm64").matches(&arm));
        assert!("linux/arm64/v8".parse::<Platform>().unwrap().matches(&arm));
        assert!(!"linux/arm64/v7".parse::<Platform>().unwrap().matches(&arm));
        assert!(!Platform::new("linux", "amd64").matches(&arm));
    }
}
