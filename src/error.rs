//! Error types for roverd

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// roverd error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Device not initialized
    #[error("Device not initialized")]
    NotInitialized,

    /// Device already initialized
    #[error("Device already initialized")]
    AlreadyInitialized,

    /// Device initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Driver call returned a failure status
    #[error("Device error: {0}")]
    Device(String),

    /// Message that must not appear on this path
    #[error("Unsupported message tag {0:#04x}")]
    UnsupportedMessage(u8),

    /// Unknown device kind in config
    #[error("Unknown device kind: {0}")]
    UnknownDeviceKind(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Fail-fast escalation for unrecoverable worker-thread errors.
///
/// Logs the error and raises SIGTERM on the daemon's own process so the
/// signal handler drives an orderly full shutdown. A hardware-control
/// process with a half-applied command or broken protocol state must not
/// keep running, so no per-thread recovery is attempted.
pub fn fail_fast(component: &str, err: &Error) {
    log::error!("{component}: fatal error: {err}");
    if signal_hook::low_level::raise(signal_hook::consts::SIGTERM).is_err() {
        // Cannot even signal ourselves; last resort.
        std::process::exit(1);
    }
}
