use std::time::Duration;

use chrono::{DateTime, Utc};

use super::descriptor::Descriptor;

/// A registry row as persisted by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    /// Identity written at registration and on every renewal.
    pub descriptor: Descriptor,
    /// Time of the last write, registration or renewal.
    pub registry_time: DateTime<Utc>,
}

impl RegistryRecord {
    /// Create a record stamped at `registry_time`.
    pub fn new(descriptor: Descriptor, registry_time: DateTime<Utc>) -> Self {
        Self {
            descriptor,
            registry_time,
        }
    }

    /// Whether readers should treat the instance as dead at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => now - self.registry_time > threshold,
            Err(_) => false,
        }
    }
}
