use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use m3_common::config::Config;
use m3_common::error::{M3Error, Result};
use m3_common::model::ModpackSpec;
use m3_core::{CuratedArtifact, ModSet, Resolver};
use m3_net::http::build_http_client;
use tracing::warn;

use crate::status;

#[derive(Args, Debug)]
pub struct Outdated {
    /// Local modpack definition (defaults to modpack.json)
    #[arg(short = 'c', long)]
    pub spec: Option<PathBuf>,
}

impl Outdated {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let path = self.spec.as_ref().unwrap_or(&config.spec_file);
        let spec = ModpackSpec::from_file(path)?;
        let resolver = Resolver::default();
        let resolved = ModSet::from_raw(&spec.mods, &resolver);
        for e in &resolved.errors {
            warn!("Skipping unresolvable record: {}", e);
        }
        let curated: Vec<CuratedArtifact> = resolved.set.curated().cloned().collect();
        if curated.is_empty() {
            println!("No curated mods to check.");
            return Ok(());
        }

        let client = Arc::new(build_http_client(None)?);
        let pb = status::create_spinner(&format!("Checking {} mods for updates", curated.len()));
        let results: Vec<(CuratedArtifact, Result<Option<String>>)> = stream::iter(curated)
            .map(|artifact| {
                let client = Arc::clone(&client);
                async move {
                    let latest = artifact.latest_file_id(&client).await;
                    (artifact, latest)
                }
            })
            .buffer_unordered(config.concurrency)
            .collect()
            .await;
        pb.finish_and_clear();

        let mut outdated = 0;
        let mut failures: Vec<(String, M3Error)> = Vec::new();
        for (artifact, latest) in results {
            match latest {
                Ok(Some(id)) if id != artifact.file_id() => {
                    outdated += 1;
                    println!(
                        "  {} {} -> {}",
                        artifact.name().bold(),
                        artifact.file_id().dimmed(),
                        id.green()
                    );
                }
                Ok(Some(_)) => {}
                Ok(None) => warn!("No release listing found for {}", artifact.name()),
                Err(e) => failures.push((artifact.name().to_string(), e)),
            }
        }
        for (name, e) in &failures {
            eprintln!("{} {}: {}", "✗".red().bold(), name, e);
        }

        if outdated == 0 {
            println!("All curated mods are up to date.");
        } else {
            println!("{outdated} mods have newer releases");
        }
        if !failures.is_empty() {
            return Err(M3Error::Generic(format!(
                "could not check {} mods",
                failures.len()
            )));
        }
        Ok(())
    }
}
