/// Lifecycle of a registry client.
///
/// ```text
/// Unregistered -> Registering -> Registered | RegistrationFailed
/// Registered -> Renewing -> Registered
/// Registered | Renewing -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Constructed, renewal armed but not running.
    Unregistered,
    /// Initial delete + insert in progress.
    Registering,
    /// Record written, renewal running.
    Registered,
    /// A renewal tick is writing to the store.
    Renewing,
    /// Initial registration failed. Never retried automatically.
    RegistrationFailed,
    /// Renewal cancelled by `stop`.
    Stopped,
}

impl RegistryState {
    /// Convert to string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Renewing => "renewing",
            Self::RegistrationFailed => "registration_failed",
            Self::Stopped => "stopped",
        }
    }

    /// Whether a registry record has been written and is being renewed.
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered | Self::Renewing)
    }
}

impl std::fmt::Display for RegistryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
