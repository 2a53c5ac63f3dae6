//! Error types for erpgate

use thiserror::Error;

/// Core error type for connector and pool operations
///
/// `Connection`, `Authentication`, `Timeout` and `Backend` are the failures a
/// backend can surface. The remaining variants describe misuse or plumbing
/// failures around it.
#[derive(Error, Debug)]
pub enum ErpError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Rate limited by backend (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown connector type: {0}")]
    UnknownConnector(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection pool '{0}' not found")]
    PoolNotFound(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for erpgate operations
pub type Result<T> = std::result::Result<T, ErpError>;
