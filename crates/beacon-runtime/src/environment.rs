use std::net::{IpAddr, UdpSocket};

use beacon_core::config::InstanceConfig;
use beacon_core::error::{BeaconError, Result};
use beacon_core::registry::InstanceEnvironment;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Discovers the identity of the running process.
///
/// Configured overrides win; otherwise values come from environment
/// variables, and the host falls back to network discovery.
///
/// | field         | variables                     |
/// |---------------|-------------------------------|
/// | host          | `BEACON_HOST`                 |
/// | port          | `BEACON_PORT`, `PORT`         |
/// | install_dir   | `BASE_HOME`                   |
/// | profiles      | `BEACON_PROFILES` (comma list)|
/// | project_name  | `BEACON_PROJECT_NAME`         |
/// | build_version | `BEACON_BUILD_VERSION`        |
/// | build_time    | `BEACON_BUILD_TIME`           |
pub struct SystemEnvironment {
    overrides: InstanceConfig,
    lookup: EnvLookup,
}

impl SystemEnvironment {
    /// Read from the process environment.
    pub fn new(overrides: InstanceConfig) -> Self {
        Self::with_lookup(overrides, |key| std::env::var(key).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    pub fn with_lookup(
        overrides: InstanceConfig,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            overrides,
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl InstanceEnvironment for SystemEnvironment {
    fn host(&self) -> Result<String> {
        if let Some(host) = self.overrides.host.clone().or_else(|| self.var("BEACON_HOST")) {
            return Ok(host);
        }
        if let Some(ip) = routable_address() {
            return Ok(ip.to_string());
        }
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .map_err(|e| BeaconError::NotFound(format!("No routable address or hostname: {}", e)))
    }

    fn port(&self) -> Result<u16> {
        if let Some(port) = self.overrides.port {
            return Ok(port);
        }
        for key in ["BEACON_PORT", "PORT"] {
            if let Some(value) = self.var(key) {
                return value.parse::<u16>().map_err(|e| {
                    BeaconError::Config(format!("{} is not a valid port ({:?}): {}", key, value, e))
                });
            }
        }
        Err(BeaconError::NotFound(
            "Listening port not configured (instance.port, BEACON_PORT or PORT)".into(),
        ))
    }

    fn install_dir(&self) -> Option<String> {
        self.overrides
            .install_dir
            .clone()
            .or_else(|| self.var("BASE_HOME"))
    }

    fn profiles(&self) -> Vec<String> {
        if !self.overrides.profiles.is_empty() {
            return self.overrides.profiles.clone();
        }
        self.var("BEACON_PROFILES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn project_name(&self) -> Option<String> {
        self.overrides
            .project_name
            .clone()
            .or_else(|| self.var("BEACON_PROJECT_NAME"))
    }

    fn build_version(&self) -> Option<String> {
        self.overrides
            .build_version
            .clone()
            .or_else(|| self.var("BEACON_BUILD_VERSION"))
    }

    fn build_time(&self) -> Option<String> {
        self.overrides
            .build_time
            .clone()
            .or_else(|| self.var("BEACON_BUILD_TIME"))
    }
}

/// Address of the interface the OS would route external traffic through.
///
/// Connecting a UDP socket sends nothing; it only selects a local address.
fn routable_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() || ip.is_loopback() {
        None
    } else {
        Some(ip)
    }
}
