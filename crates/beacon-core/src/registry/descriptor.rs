use serde::Serialize;

use super::traits::InstanceEnvironment;
use crate::error::{BeaconError, Result};

/// Identity of one running instance, as written to the registry.
///
/// Captured once from an [`InstanceEnvironment`] and never mutated. The
/// `(host, port)` pair is the natural key of the registry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    host: String,
    port: u16,
    install_dir: Option<String>,
    profile: Option<String>,
    project_name: String,
    build_version: String,
    build_time: String,
}

impl Descriptor {
    /// Capture the identity of this process.
    ///
    /// Fails when the host cannot be resolved or the port is zero; nothing
    /// else is validated.
    pub fn capture(env: &dyn InstanceEnvironment) -> Result<Self> {
        let host = env
            .host()
            .map_err(|e| BeaconError::Descriptor(format!("Failed to resolve host: {}", e)))?;
        let host = host.trim().to_string();
        if host.is_empty() {
            return Err(BeaconError::Descriptor("Resolved host is empty".into()));
        }

        let port = env
            .port()
            .map_err(|e| BeaconError::Descriptor(format!("Failed to resolve port: {}", e)))?;
        if port == 0 {
            return Err(BeaconError::Descriptor(
                "Resolved port must be greater than zero".into(),
            ));
        }

        let profiles = env.profiles();
        let profile = if profiles.is_empty() {
            None
        } else {
            Some(profiles.join(","))
        };

        Ok(Self {
            host,
            port,
            install_dir: env.install_dir(),
            profile,
            project_name: env.project_name().unwrap_or_default(),
            build_version: env.build_version().unwrap_or_default(),
            build_time: env.build_time().unwrap_or_default(),
        })
    }

    /// Registry key of this instance.
    pub fn key(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn install_dir(&self) -> Option<&str> {
        self.install_dir.as_deref()
    }

    /// Comma-joined profile labels, `None` when no profile is active.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    pub fn build_time(&self) -> &str {
        &self.build_time
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
