mod client;
mod lease;

pub use client::RegistryClient;
pub use lease::LeaseScheduler;
