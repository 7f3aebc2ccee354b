//! Beacon - instance self-registration with lease renewal.
//!
//! A process registers a descriptor of itself (address, build metadata,
//! install path) in a shared table on startup and keeps refreshing the row's
//! timestamp in the background. Readers treat rows whose timestamp has gone
//! stale as dead instances.
//!
//! ```ignore
//! use beacon::prelude::*;
//!
//! let config = BeaconConfig::from_file("beacon.toml")?;
//! let env = SystemEnvironment::new(config.instance.clone());
//! let db = Database::from_config(&config.database).await?;
//! let store = Arc::new(PgRegistryStore::new(db.pool().clone(), &config.registry)?);
//!
//! let client = RegistryClient::new(&env, store, &config.registry)?;
//! client.start().await?;
//! // ... serve traffic ...
//! client.stop().await;
//! ```

pub mod logging;

pub use beacon_core;
pub use beacon_runtime;

/// Prelude module for common imports.
pub mod prelude {
    pub use std::sync::Arc;

    pub use beacon_core::config::{BeaconConfig, InstanceConfig, RegistryConfig};
    pub use beacon_core::error::{BeaconError, Result};
    pub use beacon_core::registry::{
        Descriptor, InstanceEnvironment, RegistryRecord, RegistryState, RegistryStore,
    };
    pub use beacon_runtime::{Database, PgRegistryStore, RegistryClient, SystemEnvironment};
}
