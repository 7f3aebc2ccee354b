use std::path::Path;

use anyhow::Result;
use clap::Parser;

use beacon_core::config::{BeaconConfig, InstanceConfig};
use beacon_core::registry::Descriptor;
use beacon_runtime::SystemEnvironment;

/// Print the descriptor this instance would register, without touching the
/// database.
#[derive(Parser)]
pub struct DescribeCommand {
    /// Configuration file path. Optional; environment discovery is used alone
    /// when the file does not exist.
    #[arg(short, long, default_value = "beacon.toml")]
    pub config: String,

    /// Port to describe (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl DescribeCommand {
    /// Execute the describe command.
    pub fn execute(self) -> Result<()> {
        let descriptor = Descriptor::capture(&SystemEnvironment::new(self.instance()?))?;
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        Ok(())
    }

    /// Instance overrides from the `[instance]` section, if the file exists.
    /// `[database]` is not needed to describe an instance.
    fn instance(&self) -> Result<InstanceConfig> {
        let _ = dotenvy::dotenv();

        let mut instance = if Path::new(&self.config).exists() {
            BeaconConfig::instance_from_file(&self.config)?
        } else {
            InstanceConfig::default()
        };
        if let Some(port) = self.port {
            instance.port = Some(port);
        }
        Ok(instance)
    }
}
