// m3-common/src/config.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::error::{M3Error, Result};

pub const DEFAULT_CONFIG_FILENAME: &str = "m3.conf";
pub const DEFAULT_SPEC_FILENAME: &str = "modpack.json";
const DEFAULT_CONCURRENCY: usize = 3;
const DEFAULT_LISTING_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub target_dir: PathBuf,
    pub concurrency: usize,
    pub spec_file: PathBuf,
    pub remote_spec: Option<String>,
    pub java_bin: String,
    pub github_api_token: Option<String>,
    pub listing_depth: usize,
}

/// On-disk form of the config file. Every field is optional; absent fields
/// keep whatever the previous layer decided.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileConfig {
    target_directory: Option<PathBuf>,
    concurrency: Option<usize>,
    file: Option<PathBuf>,
    remote: Option<String>,
    java: Option<String>,
    listing_depth: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("."),
            concurrency: DEFAULT_CONCURRENCY,
            spec_file: PathBuf::from(DEFAULT_SPEC_FILENAME),
            remote_spec: None,
            java_bin: "java".to_string(),
            github_api_token: None,
            listing_depth: DEFAULT_LISTING_DEPTH,
        }
    }
}

impl Config {
    /// Builds the configuration from defaults, the optional JSON config file
    /// and environment overrides, in that order. A missing config file is not
    /// an error.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        debug!("Loading m3 configuration");
        let mut config = Self::default();

        let path = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        if path.is_file() {
            let data = fs::read_to_string(&path).map_err(|e| {
                M3Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            config.apply_json(&data).map_err(|e| {
                M3Error::Config(format!("Invalid config file {}: {}", path.display(), e))
            })?;
            debug!("Applied config file {}", path.display());
        } else if config_file.is_some() {
            return Err(M3Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        } else {
            debug!("No config file at {}, using defaults", path.display());
        }

        config.apply_env()?;
        config.validate()?;
        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    fn apply_json(&mut self, data: &str) -> Result<()> {
        let file: FileConfig = serde_json::from_str(data)?;
        if let Some(dir) = file.target_directory {
            self.target_dir = dir;
        }
        if let Some(n) = file.concurrency {
            self.concurrency = n;
        }
        if let Some(spec) = file.file {
            self.spec_file = spec;
        }
        if file.remote.is_some() {
            self.remote_spec = file.remote;
        }
        if let Some(java) = file.java {
            self.java_bin = java;
        }
        if let Some(depth) = file.listing_depth {
            self.listing_depth = depth;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env::var("M3_TARGET_DIR").ok().filter(|s| !s.is_empty()) {
            self.target_dir = PathBuf::from(dir);
        }
        if let Ok(n) = env::var("M3_CONCURRENCY") {
            self.concurrency = n.trim().parse().map_err(|_| {
                M3Error::Config(format!("M3_CONCURRENCY must be a positive integer, got '{n}'"))
            })?;
        }
        if let Some(java) = env::var("M3_JAVA").ok().filter(|s| !s.is_empty()) {
            self.java_bin = java;
        }
        self.github_api_token = env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(M3Error::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.target_dir.join("mods")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.target_dir.join("config")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.target_dir.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_layer_overrides_defaults() {
        let mut config = Config::default();
        config
            .apply_json(r#"{"targetDirectory": "/srv/mc", "concurrency": 8, "java": "/opt/jdk/bin/java"}"#)
            .unwrap();
        assert_eq!(config.target_dir, PathBuf::from("/srv/mc"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.java_bin, "/opt/jdk/bin/java");
        assert_eq!(config.spec_file, PathBuf::from(DEFAULT_SPEC_FILENAME));
        assert_eq!(config.mods_dir(), PathBuf::from("/srv/mc/mods"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(M3Error::Config(_))));
    }

    #[test]
    fn explicit_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.conf");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(M3Error::Config(_))
        ));
    }
}
