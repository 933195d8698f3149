use clap::Args;
use colored::Colorize;
use m3_common::config::Config;
use m3_common::error::Result;
use m3_core::Reconciler;
use tracing::debug;

#[derive(Args, Debug)]
pub struct Prune;

impl Prune {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let dir = config.mods_dir();
        debug!("Pruning disabled mods in {}", dir.display());
        let removed = Reconciler::default().prune_disabled(&dir)?;
        if removed.is_empty() {
            println!("No disabled mods in {}", dir.display());
            return Ok(());
        }
        for name in &removed {
            println!("  {} {}", "removed".red(), name);
        }
        println!("Pruned {} disabled mods", removed.len().to_string().bold());
        Ok(())
    }
}
