mod describe;
mod run;

pub use describe::DescribeCommand;
pub use run::RunCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use beacon_core::config::BeaconConfig;

/// Beacon - register this instance and keep its lease alive
#[derive(Parser)]
#[command(name = "beacon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Register this instance and renew its lease until interrupted.
    Run(RunCommand),

    /// Print the descriptor this instance would register.
    Describe(DescribeCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Describe(cmd) => cmd.execute(),
        }
    }
}

/// Load `.env` and then the configuration file.
fn load_config(path: &str) -> Result<BeaconConfig> {
    let _ = dotenvy::dotenv();

    if !Path::new(path).exists() {
        anyhow::bail!("Configuration file not found: {}", path);
    }
    Ok(BeaconConfig::from_file(path)?)
}
