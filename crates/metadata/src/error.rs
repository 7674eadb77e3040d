//! Metadata store error types.

use thiserror::Error;

/// Errors raised by metadata stores. Absent rows are `Ok(None)`, not errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare metadata database path: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid metadata configuration: {0}")]
    Config(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
