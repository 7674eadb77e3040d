//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidMapConfig(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid layergroup token: {0}")]
    InvalidToken(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
