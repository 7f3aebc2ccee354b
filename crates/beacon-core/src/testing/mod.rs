//! Testing utilities for code built on the registry client.
//!
//! [`MemoryRegistryStore`] stands in for the database: it keeps one record per
//! `(host, port)`, records every call with the tokio clock reading, and can be
//! told to fail specific operations. Pair it with `tokio::time::pause` to
//! check renewal timing without waiting in real time.

mod store;

pub use store::{MemoryRegistryStore, StoreCall, StoreOp};
