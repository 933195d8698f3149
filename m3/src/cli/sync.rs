use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use m3_common::config::Config;
use m3_common::error::{M3Error, Result};
use m3_common::model::ModpackSpec;
use m3_common::pipeline::FetchSummary;
use m3_core::config_sync::{fetch_configs, list_config_files};
use m3_core::{Installer, ModSet, Resolver};
use m3_net::http::{build_http_client, fetch_remote_spec, HttpTransport};
use m3_net::Transport;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::status;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Local modpack definition (defaults to modpack.json)
    #[arg(short = 'c', long, conflicts_with = "remote")]
    pub spec: Option<PathBuf>,

    /// URL of a remote modpack definition
    #[arg(short, long)]
    pub remote: Option<String>,

    /// Also download the Forge installer
    #[arg(long, conflicts_with = "server")]
    pub client: bool,

    /// Download the Forge installer and install the server files
    #[arg(long)]
    pub server: bool,

    /// Skip syncing the config directory
    #[arg(long)]
    pub no_configs: bool,
}

impl SyncArgs {
    pub async fn run(&self, config: &Config, verbose: u8) -> Result<()> {
        let client = build_http_client(config.github_api_token.as_deref())?;
        let spec = self.load_spec(config, &client).await?;
        let resolver = Resolver::default();

        let resolved = ModSet::from_raw(&spec.mods, &resolver);
        if !resolved.is_complete() {
            for e in &resolved.errors {
                error!("{}", e);
                eprintln!("{} {}", "✗".red().bold(), e);
            }
            return Err(M3Error::ValidationError(format!(
                "{} mod records could not be resolved",
                resolved.errors.len()
            )));
        }
        let installer = if self.client || self.server {
            Some(Installer::from_raw(&spec.forge, resolver.registry())?)
        } else {
            None
        };

        let target = config.target_dir();
        fs::create_dir_all(target).map_err(|e| {
            M3Error::IoError(format!(
                "Failed to create target directory {}: {}",
                target.display(),
                e
            ))
        })?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(client.clone()));
        let mut failed = 0;

        let set = resolved.set;
        let (report, batch) =
            set.fetch_to(&config.mods_dir(), config.concurrency, Arc::clone(&transport))?;
        status::print_reconcile(&report);
        failed += report.failures.len();
        failed += status::track("mods", set.len(), batch).await.failed.len();

        if self.no_configs {
            debug!("Skipping config sync");
        } else {
            failed += self
                .sync_configs(&spec, config, &client, Arc::clone(&transport))
                .await?
                .failed
                .len();
        }

        if let Some(installer) = installer {
            self.install_forge(&installer, target, config, verbose, transport)
                .await?;
        }

        if failed > 0 {
            return Err(M3Error::Generic(format!("{failed} files could not be synced")));
        }
        println!("{}", "Installation complete!".green().bold());
        Ok(())
    }

    async fn load_spec(&self, config: &Config, client: &Client) -> Result<ModpackSpec> {
        let remote = self.remote.as_deref().or(config.remote_spec.as_deref());
        match (&self.spec, remote) {
            (None, Some(url)) => {
                let pb = status::create_spinner(&format!("Fetching modpack definition from {url}"));
                let spec = fetch_remote_spec(client, url).await;
                pb.finish_and_clear();
                spec
            }
            (Some(path), _) => ModpackSpec::from_file(path),
            (None, None) => ModpackSpec::from_file(&config.spec_file),
        }
    }

    async fn sync_configs(
        &self,
        spec: &ModpackSpec,
        config: &Config,
        client: &Client,
        transport: Arc<dyn Transport>,
    ) -> Result<FetchSummary> {
        let pb = status::create_spinner("Listing config files");
        let files = list_config_files(&spec.config, client, config.listing_depth).await;
        pb.finish_and_clear();
        let files = files?;
        let batch = fetch_configs(&files, &config.config_dir(), config.concurrency, transport)?;
        Ok(status::track("configs", files.len(), batch).await)
    }

    async fn install_forge(
        &self,
        installer: &Installer,
        target: &Path,
        config: &Config,
        verbose: u8,
        transport: Arc<dyn Transport>,
    ) -> Result<()> {
        if !installer.is_declared() {
            return Err(M3Error::ValidationError(
                "the modpack does not declare a Forge version".to_string(),
            ));
        }
        let pb = status::create_spinner(&format!("Fetching Forge {} installer", installer.version));
        let completion = installer.fetch(target, transport).await;
        pb.finish_and_clear();
        if let Some(e) = completion?.error {
            return Err(e);
        }
        info!("Forge {} installer ready", installer.version);

        if self.server {
            println!("Installing Forge server files...");
            installer
                .install_server(target, &config.java_bin, verbose > 0)
                .await?;
            println!("{}", "Done.".green());
        }
        Ok(())
    }
}
