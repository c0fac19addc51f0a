//! Common error types for the runtime configuration components.

use std::fmt;

/// A specialized Result type for runtime configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type shared by the inspector, selector, engine and lease manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Netlink error: {0}")]
    Netlink(String),

    #[error("No suitable address: {0}")]
    NoSuitableAddress(String),

    #[error("Cluster API error: {0}")]
    Api(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Daemon control error: {0}")]
    Control(String),

    #[error("Lease error: {0}")]
    Lease(String),

    #[error("Healthcheck error: {0}")]
    Healthcheck(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new netlink error.
    pub fn netlink(msg: impl fmt::Display) -> Self {
        Error::Netlink(msg.to_string())
    }

    /// Create a new selection error.
    pub fn no_suitable_address(msg: impl fmt::Display) -> Self {
        Error::NoSuitableAddress(msg.to_string())
    }

    /// Create a new cluster API error.
    pub fn api(msg: impl fmt::Display) -> Self {
        Error::Api(msg.to_string())
    }

    /// Create a new render error.
    pub fn render(msg: impl fmt::Display) -> Self {
        Error::Render(msg.to_string())
    }

    /// Create a new daemon control error.
    pub fn control(msg: impl fmt::Display) -> Self {
        Error::Control(msg.to_string())
    }

    /// Create a new lease error.
    pub fn lease(msg: impl fmt::Display) -> Self {
        Error::Lease(msg.to_string())
    }

    /// Create a new healthcheck error.
    pub fn healthcheck(msg: impl fmt::Display) -> Self {
        Error::Healthcheck(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }

    /// Whether the error means the selector found nothing usable.
    pub fn is_no_suitable_address(&self) -> bool {
        matches!(self, Error::NoSuitableAddress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_pick_variant() {
        assert!(Error::no_suitable_address("none").is_no_suitable_address());
        assert!(!Error::control("refused").is_no_suitable_address());
        assert_eq!(
            Error::control("connection refused").to_string(),
            "Daemon control error: connection refused"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
