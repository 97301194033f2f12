//! Error types and result aliases for tidal.
//!
//! Errors are structured for programmatic handling: each variant maps to one
//! category of the catalog's failure model and carries the path, key, or
//! version needed to diagnose it without re-reading catalog internals.
//!
//! Only [`Error::CommitFailure`] is expected to be retried, and only by the
//! caller restarting its transaction.

use std::fmt;

/// The result type used throughout tidal.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tidal operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller-supplied value violates a precondition.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violated precondition.
        message: String,
    },

    /// The requested namespace, table, version, or object does not exist.
    #[error("not found: {message}")]
    ObjectNotFound {
        /// Description of what was looked up.
        message: String,
    },

    /// A create operation targeted a key that is already present.
    #[error("already exists: {message}")]
    ObjectAlreadyExists {
        /// Description of the conflicting object.
        message: String,
    },

    /// Another transaction published the target version first.
    #[error("commit failed: version {version} already exists at {path}")]
    CommitFailure {
        /// The version this transaction attempted to publish.
        version: u64,
        /// The root path that already exists.
        path: String,
    },

    /// Reading from storage failed.
    #[error("storage read failed: {message}")]
    StorageRead {
        /// Description of the read failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Writing to storage failed.
    #[error("storage write failed: {message}")]
    StorageWrite {
        /// Description of the write failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persisted catalog state violates a structural invariant.
    #[error("corrupted catalog state at {path}: {message}")]
    Corrupted {
        /// The storage path holding the corrupted object.
        path: String,
        /// Description of the violated invariant.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new not found error for a kind of object and its identifier.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::ObjectNotFound {
            message: format!("{kind} {id} does not exist"),
        }
    }

    /// Creates a new already exists error for a kind of object and its identifier.
    #[must_use]
    pub fn already_exists(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::ObjectAlreadyExists {
            message: format!("{kind} {id} already exists"),
        }
    }

    /// Creates a new storage read error with the given message.
    #[must_use]
    pub fn storage_read(message: impl Into<String>) -> Self {
        Self::StorageRead {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage read error with a source cause.
    #[must_use]
    pub fn storage_read_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StorageRead {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new storage write error with the given message.
    #[must_use]
    pub fn storage_write(message: impl Into<String>) -> Self {
        Self::StorageWrite {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage write error with a source cause.
    #[must_use]
    pub fn storage_write_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StorageWrite {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new corruption error for the object at `path`.
    #[must_use]
    pub fn corrupted(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry by restarting its transaction.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CommitFailure { .. })
    }

    /// Returns true if this error reports a missing object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_commit_failure_is_retryable() {
        let conflict = Error::CommitFailure {
            version: 3,
            path: "_1100000000000000000000000000000000000000000000000000000000000000.ipc".into(),
        };
        assert!(conflict.is_retryable());

        assert!(!Error::invalid_argument("bad").is_retryable());
        assert!(!Error::not_found("namespace", "ns1").is_retryable());
        assert!(!Error::corrupted("root", "n_keys mismatch").is_retryable());
        assert!(!Error::storage_read("timeout").is_retryable());
    }

    #[test]
    fn messages_carry_context() {
        let err = Error::not_found("namespace", "ns1");
        assert_eq!(err.to_string(), "not found: namespace ns1 does not exist");

        let err = Error::already_exists("table", "ns1.t1");
        assert_eq!(err.to_string(), "already exists: table ns1.t1 already exists");

        let err = Error::CommitFailure {
            version: 7,
            path: "some/path".into(),
        };
        assert!(err.to_string().contains("version 7"));
        assert!(err.to_string().contains("some/path"));
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::storage_write_with_source("write _latest_hint.txt", io);
        assert!(err.source().is_some());
    }
}
