//! Error types for the instance crate

use thiserror::Error;

/// Errors that can occur while reading or encoding instance data
#[derive(Error, Debug)]
pub enum Error {
    /// The stored schema version is not a base-10 integer
    #[error("invalid schema version in state metadata: {0:?}")]
    InvalidSchemaVersion(String),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for instance operations
pub type Result<T> = std::result::Result<T, Error>;
