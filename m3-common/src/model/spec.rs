// m3-common/src/model/spec.rs
//! Import containers for a modpack definition. These carry the raw,
//! unvalidated fields; resolution into fetchables happens in `m3-core`.
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{M3Error, Result};

/// A complete modpack definition as written in `modpack.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModpackSpec {
    pub forge: RawInstaller,
    pub config: ConfigSource,
    pub mods: RawModSet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawInstaller {
    pub version: String,
    pub checksum: String,
    pub server_checksum: String,
}

/// Location of the mod configuration files, as `owner/name` plus a path
/// inside that repository.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigSource {
    pub repository: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawModSet {
    pub ignore: Vec<String>,
    pub items: Vec<RawMod>,
}

/// One loosely specified mod record. Which fields are set decides which
/// fetchable variant it resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawMod {
    pub name: String,
    pub version: String,
    pub checksum: String,
    pub url: String,
    pub curse: String,
}

impl RawMod {
    /// Label used in error messages; falls back to the URL when the name is
    /// missing.
    pub fn label(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else if !self.url.is_empty() {
            self.url.clone()
        } else if !self.curse.is_empty() {
            format!("curse:{}", self.curse)
        } else {
            "<unnamed>".to_string()
        }
    }
}

impl ModpackSpec {
    pub fn from_json(data: &str) -> Result<Self> {
        let spec: ModpackSpec = serde_json::from_str(data)?;
        debug!(
            "Parsed modpack spec: forge {}, {} mods, config from '{}'",
            spec.forge.version,
            spec.mods.items.len(),
            spec.config.repository
        );
        Ok(spec)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            M3Error::IoError(format!(
                "Failed to read modpack spec {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&data)
    }
}
