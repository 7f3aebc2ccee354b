use serde::{Deserialize, Serialize};

/// Overrides for the identity this process registers.
///
/// Every field is optional; unset fields fall back to environment discovery.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstanceConfig {
    /// Routable address other systems should use to reach this instance.
    pub host: Option<String>,

    /// Listening port.
    pub port: Option<u16>,

    /// Install directory of the application.
    pub install_dir: Option<String>,

    /// Active profile labels.
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Project name.
    pub project_name: Option<String>,

    /// Build version.
    pub build_version: Option<String>,

    /// Build timestamp, as produced by the build.
    pub build_time: Option<String>,
}
