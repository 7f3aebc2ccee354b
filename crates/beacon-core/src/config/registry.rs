use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, Result};

/// Registration and lease renewal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Table holding one row per registered instance.
    #[serde(default = "default_table")]
    pub table: String,

    /// Seconds between the end of one renewal and the start of the next.
    #[serde(default = "default_renew_interval")]
    pub renew_interval_secs: u64,

    /// How long `stop` waits for an in-flight renewal before aborting it.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Delete the registry row on graceful shutdown.
    ///
    /// Off by default: readers age out stopped instances by `registry_time`.
    #[serde(default)]
    pub deregister_on_shutdown: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            renew_interval_secs: default_renew_interval(),
            stop_timeout_secs: default_stop_timeout(),
            deregister_on_shutdown: false,
        }
    }
}

impl RegistryConfig {
    /// Renewal period as a duration.
    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }

    /// Grace period for an in-flight renewal during `stop`.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Reject a zero renewal period or a table name that is not a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if self.renew_interval_secs == 0 {
            return Err(BeaconError::Config(
                "registry.renew_interval_secs must be greater than zero".into(),
            ));
        }
        if !is_identifier(&self.table) {
            return Err(BeaconError::Config(format!(
                "registry.table is not a valid table name: {:?}",
                self.table
            )));
        }
        Ok(())
    }
}

fn default_table() -> String {
    "mon_app_registry".to_string()
}

fn default_renew_interval() -> u64 {
    60
}

fn default_stop_timeout() -> u64 {
    5
}

/// The table name is spliced into SQL text, so only plain identifiers pass.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
