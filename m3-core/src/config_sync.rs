// m3-core/src/config_sync.rs
//! Mirrors a directory of a GitHub repository into the local `config/`
//! directory. Files are only ever added or replaced, never disabled.
use std::path::Path;
use std::sync::Arc;

use m3_common::error::Result;
use m3_common::model::ConfigSource;
use m3_net::fetch::{fetch_all, FetchBatch, Transport};
use m3_net::github::{ContentEntry, Repository};
use reqwest::Client;
use tracing::{debug, info};

use crate::artifact::{Artifact, GitContentArtifact};

/// Git-content artifacts for every file entry, named relative to `prefix`.
pub fn artifacts_from_listing(entries: &[ContentEntry], prefix: &str) -> Vec<Artifact> {
    entries
        .iter()
        .filter(|entry| entry.is_file())
        .filter_map(|entry| GitContentArtifact::from_entry(entry, prefix))
        .map(Artifact::GitContent)
        .collect()
}

/// Lists every config file declared by `source`. A source without a
/// repository yields nothing.
pub async fn list_config_files(
    source: &ConfigSource,
    client: &Client,
    max_depth: usize,
) -> Result<Vec<Artifact>> {
    if source.repository.trim().is_empty() {
        debug!("No config repository declared");
        return Ok(Vec::new());
    }
    let repo = Repository::parse(source.repository.trim())?;
    let entries = repo.aggregate(client, &source.path, max_depth).await?;
    let artifacts = artifacts_from_listing(&entries, &source.path);
    info!(
        "Found {} config files in {}/{}",
        artifacts.len(),
        repo.owner,
        repo.name
    );
    Ok(artifacts)
}

/// Starts fetching the config files missing from `dir`.
pub fn fetch_configs(
    files: &[Artifact],
    dir: &Path,
    concurrency: usize,
    transport: Arc<dyn Transport>,
) -> Result<FetchBatch> {
    fetch_all(files, dir, concurrency, transport)
}
