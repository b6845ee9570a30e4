//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
///
/// These kinds exist for logging and diagnostics. At the public boundary
/// every one of them resolves to a deny.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Permission graph store unreachable
    #[error("Permission store unavailable: {0}")]
    StoreUnavailable(String),

    /// Cycle or invalid parent in the menu graph
    #[error("Structural inconsistency: {0}")]
    StructuralInconsistency(String),

    /// Cache store unreachable
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// No endpoint template matches the request
    #[error("Unknown endpoint: {method} {path}")]
    UnknownEndpoint { method: String, path: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        AuthzError::Serialization(err.to_string())
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
