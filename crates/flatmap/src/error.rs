//! Error types for the flatmap crate

use thiserror::Error;

/// Errors that can occur while reading a flat map
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A count marker holds something other than a non-negative integer
    #[error("invalid count marker at {path}: {value:?}")]
    InvalidCount { path: String, value: String },
}

/// Result type for flatmap operations
pub type Result<T> = std::result::Result<T, Error>;
