use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use super::descriptor::Descriptor;
use crate::config::InstanceConfig;
use crate::error::{BeaconError, Result};

/// Future returned by [`RegistryStore`] writes.
pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Backing store for registry records.
///
/// Each call is one logical write keyed by `(host, port)`. Implementations
/// must be safe to call from the startup path and the renewal task at once;
/// the registry client adds no locking of its own.
pub trait RegistryStore: Send + Sync {
    /// Remove any record for `host:port`. Removing nothing is not an error.
    fn delete<'a>(&'a self, host: &'a str, port: u16) -> StoreFuture<'a>;

    /// Insert a fresh record for `descriptor`.
    fn insert<'a>(
        &'a self,
        descriptor: &'a Descriptor,
        registry_time: DateTime<Utc>,
    ) -> StoreFuture<'a>;

    /// Rewrite the non-key fields and `registry_time` of the record keyed by
    /// the descriptor's `(host, port)`.
    ///
    /// Returns [`BeaconError::NotFound`] when no such record exists.
    fn update<'a>(
        &'a self,
        descriptor: &'a Descriptor,
        registry_time: DateTime<Utc>,
    ) -> StoreFuture<'a>;
}

/// Source of the identity fields captured into a [`Descriptor`].
pub trait InstanceEnvironment {
    /// Routable address of this instance.
    fn host(&self) -> Result<String>;

    /// Listening port of this instance.
    fn port(&self) -> Result<u16>;

    fn install_dir(&self) -> Option<String>;

    /// Active profile labels, possibly empty.
    fn profiles(&self) -> Vec<String>;

    fn project_name(&self) -> Option<String>;

    fn build_version(&self) -> Option<String>;

    fn build_time(&self) -> Option<String>;
}

/// Configured values only, with no discovery.
impl InstanceEnvironment for InstanceConfig {
    fn host(&self) -> Result<String> {
        self.host
            .clone()
            .ok_or_else(|| BeaconError::NotFound("instance.host is not configured".into()))
    }

    fn port(&self) -> Result<u16> {
        self.port
            .ok_or_else(|| BeaconError::NotFound("instance.port is not configured".into()))
    }

    fn install_dir(&self) -> Option<String> {
        self.install_dir.clone()
    }

    fn profiles(&self) -> Vec<String> {
        self.profiles.clone()
    }

    fn project_name(&self) -> Option<String> {
        self.project_name.clone()
    }

    fn build_version(&self) -> Option<String> {
        self.build_version.clone()
    }

    fn build_time(&self) -> Option<String> {
        self.build_time.clone()
    }
}
