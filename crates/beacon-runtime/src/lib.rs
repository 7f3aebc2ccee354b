pub mod db;
pub mod environment;
pub mod registry;
pub mod store;

pub use db::Database;
pub use environment::SystemEnvironment;
pub use registry::{LeaseScheduler, RegistryClient};
pub use store::PgRegistryStore;
