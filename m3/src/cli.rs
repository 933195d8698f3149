// m3/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use m3_common::error::Result;
use m3_common::Config;

pub mod outdated;
pub mod prune;
pub mod sync;

use crate::cli::outdated::Outdated;
use crate::cli::prune::Prune;
use crate::cli::sync::SyncArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "m3", bin_name = "m3")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding the game or server installation
    #[arg(short, long, global = true)]
    pub target: Option<PathBuf>,

    /// Number of simultaneous downloads
    #[arg(short = 'n', long, global = true)]
    pub jobs: Option<usize>,

    /// m3 configuration file (defaults to ./m3.conf when present)
    #[arg(short = 'f', long, global = true)]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliArgs {
    /// Command-line values win over the config file and environment.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(target) = &self.target {
            config.target_dir = target.clone();
        }
        if let Some(jobs) = self.jobs {
            config.concurrency = jobs.max(1);
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring mods, configs and optionally Forge in line with the modpack
    Sync(SyncArgs),
    /// Delete every disabled mod in the target directory
    Prune(Prune),
    /// List curated mods with a newer release available
    Outdated(Outdated),
}

impl Command {
    pub async fn run(&self, config: &Config, verbose: u8) -> Result<()> {
        match self {
            Self::Sync(command) => command.run(config, verbose).await,
            Self::Prune(command) => command.run(config).await,
            Self::Outdated(command) => command.run(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn global_flags_override_config() {
        let args =
            CliArgs::try_parse_from(["m3", "-vv", "-t", "/srv/mc", "sync", "-n", "0", "--server"])
                .unwrap();
        assert_eq!(args.verbose, 2);
        let mut config = Config::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.target_dir, PathBuf::from("/srv/mc"));
        assert_eq!(config.concurrency, 1);
        assert!(matches!(args.command, Command::Sync(ref s) if s.server && !s.client));
    }

    #[test]
    fn client_and_server_conflict() {
        assert!(CliArgs::try_parse_from(["m3", "sync", "--client", "--server"]).is_err());
        assert!(CliArgs::try_parse_from(["m3", "sync", "--spec", "a.json", "--remote", "u"]).is_err());
    }
}
