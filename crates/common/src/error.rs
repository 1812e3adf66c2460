//! Common error types for sentinel pool components.

use std::fmt;
use std::time::Duration;

/// A specialized Result type for link and connection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport and protocol error shared by sentinel links and primary connections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new protocol error.
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Error::Protocol(msg.to_string())
    }

    /// Create a new server error (an error reply from the remote side).
    pub fn server(msg: impl fmt::Display) -> Self {
        Error::Server(msg.to_string())
    }

    /// Create a new authentication error.
    pub fn auth(msg: impl fmt::Display) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new TLS error.
    pub fn tls(msg: impl fmt::Display) -> Self {
        Error::Tls(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }

    /// Whether the underlying connection must be considered unusable.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Timeout(_) | Error::Closed | Error::Tls(_))
    }
}
