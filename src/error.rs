//! Error types for the trackside reminder engine.

/// Top-level error type for notification scheduling and reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum TracksideError {
    /// Notification permission was never granted (requires user action).
    #[error("permission error: {0}")]
    Permission(String),

    /// The OS notification capability failed or is unavailable.
    #[error("notification capability error: {0}")]
    Capability(String),

    /// Persisted schedule store error (read, parse, write).
    #[error("storage error: {0}")]
    Storage(String),

    /// Remote content payload had an unusable shape.
    #[error("payload error: {0}")]
    Payload(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Host bridge channel error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TracksideError>;
