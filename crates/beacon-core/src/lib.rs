pub mod config;
pub mod error;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::BeaconConfig;
pub use error::{BeaconError, Result};
pub use registry::{
    Descriptor, InstanceEnvironment, RegistryRecord, RegistryState, RegistryStore, StoreFuture,
};
