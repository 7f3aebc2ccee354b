use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::info;

use beacon::logging;
use beacon_runtime::{Database, PgRegistryStore, RegistryClient, SystemEnvironment};

use super::load_config;

/// Register this instance and renew its lease until interrupted.
#[derive(Parser)]
pub struct RunCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "beacon.toml")]
    pub config: String,

    /// Port to register (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to register (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Renewal period in seconds (overrides config).
    #[arg(long)]
    pub interval: Option<u64>,

    /// Do not create the registry table if it is missing.
    #[arg(long)]
    pub skip_schema: bool,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        let mut config = load_config(&self.config)?;

        // Apply command-line overrides
        if let Some(port) = self.port {
            config.instance.port = Some(port);
        }
        if let Some(host) = self.host.clone() {
            config.instance.host = Some(host);
        }
        if let Some(interval) = self.interval {
            config.registry.renew_interval_secs = interval;
            config.registry.validate()?;
        }

        logging::init(&config.logging, self.verbose);

        println!();
        println!(
            "  {} v{}",
            style("BEACON").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        info!("Loaded configuration from {}", self.config);

        let env = SystemEnvironment::new(config.instance.clone());
        let descriptor = beacon_core::registry::Descriptor::capture(&env)?;

        let db = Database::from_config(&config.database).await?;
        info!("Connected to database");

        let store = Arc::new(PgRegistryStore::new(db.pool().clone(), &config.registry)?);
        if !self.skip_schema {
            store.ensure_schema().await?;
        }

        let client = RegistryClient::with_descriptor(descriptor, store, &config.registry)?;
        if let Err(e) = client.start().await {
            db.close().await;
            return Err(e.into());
        }

        println!(
            "  {} Registered {} in {} (renewing every {}s)",
            style("●").green(),
            style(client.descriptor()).cyan(),
            config.registry.table,
            config.registry.renew_interval_secs
        );
        println!();

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");

        client.stop().await;
        db.close().await;

        println!("\n  {} Stopped", style("○").dim());
        Ok(())
    }
}
