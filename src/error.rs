//! Error types for statuscache
//!
//! Only `CacheError` crosses an operation boundary. Per-record
//! serialization problems (`EncodeError`, `DecodeError`) are absorbed
//! by the writer and reader and reported as counts instead.

use thiserror::Error;

/// Operation-level error type
///
/// Every store, writer, reader and sweeper call returns this on failure.
/// A batch write that fails with `Storage` has been rolled back in full.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storage engine failure (I/O, constraint violation, malformed statement)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Schema bootstrap script could not be read
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        CacheError::Config(err.to_string())
    }
}

/// A record could not be turned into a payload blob
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("record is not representable as JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("encoded record is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// A stored payload blob could not be turned back into a record
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;
