mod postgres;

pub use postgres::PgRegistryStore;
