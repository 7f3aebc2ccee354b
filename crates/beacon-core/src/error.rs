use thiserror::Error;

/// Core error type for Beacon operations.
#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Descriptor error: {0}")]
    Descriptor(String),

    #[error("Failed to register {host}:{port}: {source}")]
    Registration {
        host: String,
        port: u16,
        #[source]
        source: Box<BeaconError>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl BeaconError {
    /// Wrap a store failure raised while registering `host:port`.
    pub fn registration(host: impl Into<String>, port: u16, source: BeaconError) -> Self {
        Self::Registration {
            host: host.into(),
            port,
            source: Box::new(source),
        }
    }
}

/// Result type alias using BeaconError.
pub type Result<T> = std::result::Result<T, BeaconError>;
