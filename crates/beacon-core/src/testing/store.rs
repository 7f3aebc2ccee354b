//! In-memory registry store that records every call.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::{BeaconError, Result};
use crate::registry::{Descriptor, RegistryRecord, RegistryStore, StoreFuture};

/// Store operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Delete,
    Insert,
    Update,
}

/// One call issued against the store.
#[derive(Debug, Clone)]
pub struct StoreCall {
    /// Which operation was called.
    pub op: StoreOp,
    /// Key host.
    pub host: String,
    /// Key port.
    pub port: u16,
    /// Timestamp passed by the caller, for inserts and updates.
    pub registry_time: Option<DateTime<Utc>>,
    /// Tokio clock reading when the call was issued.
    pub at: Instant,
    /// Whether the call returned `Ok`.
    pub succeeded: bool,
}

/// Keyed in-memory [`RegistryStore`].
///
/// Inserting an existing `(host, port)` fails like a primary-key conflict
/// would, so tests observe the one-row-per-key invariant directly.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(MemoryRegistryStore::new());
/// store.fail_next(StoreOp::Update, 1);
///
/// // ... drive a registry client ...
///
/// assert_eq!(store.count(StoreOp::Delete), 1);
/// assert_eq!(store.records().len(), 1);
/// ```
#[derive(Default)]
pub struct MemoryRegistryStore {
    records: RwLock<HashMap<(String, u16), RegistryRecord>>,
    calls: RwLock<Vec<StoreCall>>,
    failures: Mutex<HashMap<StoreOp, u32>>,
}

impl MemoryRegistryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with a database error.
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        lock(&self.failures).insert(op, times);
    }

    /// Make every future call of `op` fail.
    pub fn fail_always(&self, op: StoreOp) {
        self.fail_next(op, u32::MAX);
    }

    /// Stop injecting failures for `op`.
    pub fn recover(&self, op: StoreOp) {
        lock(&self.failures).remove(&op);
    }

    /// Put a record in place without recording a call, e.g. a leftover row
    /// from an earlier unclean shutdown.
    pub fn seed(&self, record: RegistryRecord) {
        let key = key_of(&record.descriptor);
        write(&self.records).insert(key, record);
    }

    /// Current record for `host:port`.
    pub fn record(&self, host: &str, port: u16) -> Option<RegistryRecord> {
        read(&self.records).get(&(host.to_string(), port)).cloned()
    }

    /// All current records.
    pub fn records(&self) -> Vec<RegistryRecord> {
        read(&self.records).values().cloned().collect()
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        read(&self.calls).clone()
    }

    /// Calls of one operation kind, in order.
    pub fn calls_of(&self, op: StoreOp) -> Vec<StoreCall> {
        read(&self.calls)
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    /// Number of calls of one operation kind.
    pub fn count(&self, op: StoreOp) -> usize {
        read(&self.calls).iter().filter(|c| c.op == op).count()
    }

    fn take_failure(&self, op: StoreOp) -> bool {
        let mut failures = lock(&self.failures);
        match failures.get_mut(&op) {
            None => false,
            Some(remaining) if *remaining == 0 => false,
            Some(remaining) if *remaining == u32::MAX => true,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }

    fn apply(
        &self,
        op: StoreOp,
        host: &str,
        port: u16,
        registry_time: Option<DateTime<Utc>>,
        write_op: impl FnOnce(&mut HashMap<(String, u16), RegistryRecord>) -> Result<()>,
    ) -> Result<()> {
        let at = Instant::now();
        let result = if self.take_failure(op) {
            Err(BeaconError::Database(format!(
                "injected {:?} failure for {}:{}",
                op, host, port
            )))
        } else {
            write_op(&mut write(&self.records))
        };

        write(&self.calls).push(StoreCall {
            op,
            host: host.to_string(),
            port,
            registry_time,
            at,
            succeeded: result.is_ok(),
        });
        result
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn delete<'a>(&'a self, host: &'a str, port: u16) -> StoreFuture<'a> {
        Box::pin(async move {
            self.apply(StoreOp::Delete, host, port, None, |records| {
                records.remove(&(host.to_string(), port));
                Ok(())
            })
        })
    }

    fn insert<'a>(
        &'a self,
        descriptor: &'a Descriptor,
        registry_time: DateTime<Utc>,
    ) -> StoreFuture<'a> {
        Box::pin(async move {
            let (host, port) = descriptor.key();
            self.apply(StoreOp::Insert, host, port, Some(registry_time), |records| {
                let key = key_of(descriptor);
                if records.contains_key(&key) {
                    return Err(BeaconError::Database(format!(
                        "duplicate key ({}, {})",
                        key.0, key.1
                    )));
                }
                records.insert(key, RegistryRecord::new(descriptor.clone(), registry_time));
                Ok(())
            })
        })
    }

    fn update<'a>(
        &'a self,
        descriptor: &'a Descriptor,
        registry_time: DateTime<Utc>,
    ) -> StoreFuture<'a> {
        Box::pin(async move {
            let (host, port) = descriptor.key();
            self.apply(StoreOp::Update, host, port, Some(registry_time), |records| {
                match records.get_mut(&key_of(descriptor)) {
                    Some(record) => {
                        *record = RegistryRecord::new(descriptor.clone(), registry_time);
                        Ok(())
                    }
                    None => Err(BeaconError::NotFound(format!(
                        "no registry record for {}",
                        descriptor
                    ))),
                }
            })
        })
    }
}

fn key_of(descriptor: &Descriptor) -> (String, u16) {
    (descriptor.host().to_string(), descriptor.port())
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}
