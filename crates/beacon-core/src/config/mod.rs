mod database;
mod instance;
mod logging;
mod registry;

pub use database::DatabaseConfig;
pub use instance::InstanceConfig;
pub use logging::LoggingConfig;
pub use registry::RegistryConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BeaconError, Result};

/// Root configuration for Beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Registration and lease renewal configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Overrides for the registered instance identity.
    #[serde(default)]
    pub instance: InstanceConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BeaconConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BeaconError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| BeaconError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load only the `[instance]` section of a configuration file.
    ///
    /// The other sections are neither required nor validated, so a file
    /// holding just instance overrides is accepted.
    pub fn instance_from_file(path: impl AsRef<Path>) -> Result<InstanceConfig> {
        #[derive(Deserialize)]
        struct InstanceSection {
            #[serde(default)]
            instance: InstanceConfig,
        }

        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BeaconError::Config(format!("Failed to read config file: {}", e)))?;
        let section: InstanceSection = toml::from_str(&substitute_env_vars(&content))
            .map_err(|e| BeaconError::Config(format!("Failed to parse config: {}", e)))?;
        Ok(section.instance)
    }

    /// Load configuration with defaults.
    pub fn default_with_database_url(url: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: url.to_string(),
                ..Default::default()
            },
            registry: RegistryConfig::default(),
            instance: InstanceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(BeaconError::Config("database.url must not be empty".into()));
        }
        self.registry.validate()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => result = result.replace(&cap[0], &value),
            Err(_) => tracing::warn!(var = var_name, "Config references unset environment variable"),
        }
    }

    result
}
