//! Error types for schema handling and reconciliation

use instance::InstanceState;
use std::fmt;
use thiserror::Error;

/// Lifecycle callbacks a resource author can supply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Exists,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Exists => "exists",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while validating schemas or reconciling instances
#[derive(Error, Debug)]
pub enum Error {
    /// The resource schema is malformed (reported by internal validation only)
    #[error("invalid resource schema: {}", .0.join("; "))]
    InvalidSchema(Vec<String>),

    /// Validation was asked to check a resource that does not exist
    #[error("resource is not defined")]
    MissingResource,

    /// A value does not fit the declared field type
    #[error("{path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: &'static str,
    },

    /// The path does not name a field in the schema
    #[error("{0}: no such field in schema")]
    UnknownField(String),

    /// A stored attribute could not be read back as its declared type
    #[error("failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    /// The resource does not define the callback the operation needs
    #[error("resource does not support {0}")]
    MissingCallback(Operation),

    /// The state migration callback failed
    #[error("failed to migrate state from schema version {from}: {source}")]
    Migration {
        from: u64,
        #[source]
        source: anyhow::Error,
    },

    /// An author-supplied lifecycle callback failed
    #[error("{operation} failed: {source}")]
    Callback {
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },

    /// No resource is registered under this type name
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    /// The batch thread pool could not be created
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Flatmap(#[from] flatmap::Error),

    #[error(transparent)]
    Instance(#[from] instance::Error),

    /// Schema or config file is not valid TOML
    #[error("invalid TOML: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn callback(operation: Operation, source: anyhow::Error) -> Self {
        Self::Callback { operation, source }
    }
}

/// Result type for schema and codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// A failed Apply or Refresh, carrying the best known resulting state.
///
/// `state` is what the caller should persist: partial writes from a
/// failed callback, the untouched input state when nothing was attempted,
/// or `None` when nothing can be said about the instance.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ReconcileError {
    pub state: Option<InstanceState>,
    #[source]
    pub error: Error,
}

impl ReconcileError {
    pub fn new(state: Option<InstanceState>, error: Error) -> Self {
        Self { state, error }
    }

    /// An error with no state worth keeping
    pub fn stateless(error: Error) -> Self {
        Self { state: None, error }
    }

    pub fn into_parts(self) -> (Option<InstanceState>, Error) {
        (self.state, self.error)
    }
}

impl From<Error> for ReconcileError {
    fn from(error: Error) -> Self {
        Self::stateless(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::TypeMismatch {
            path: "foo".into(),
            expected: "int".into(),
            actual: "string",
        };
        assert_eq!(err.to_string(), "foo: expected int, got string");

        let err = Error::InvalidSchema(vec!["a: bad".into(), "b: worse".into()]);
        assert_eq!(err.to_string(), "invalid resource schema: a: bad; b: worse");

        let err = Error::MissingCallback(Operation::Update);
        assert_eq!(err.to_string(), "resource does not support update");
    }

    #[test]
    fn test_callback_error_keeps_source() {
        let err = Error::callback(Operation::Delete, anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "delete failed: boom");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_reconcile_error_parts() {
        let err = ReconcileError::new(
            Some(InstanceState::new("bar")),
            Error::MissingCallback(Operation::Read),
        );
        assert_eq!(err.to_string(), "resource does not support read");
        let (state, inner) = err.into_parts();
        assert_eq!(state.map(|s| s.id), Some("bar".to_string()));
        assert!(matches!(inner, Error::MissingCallback(Operation::Read)));
    }
}
