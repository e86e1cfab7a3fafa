//! Error types for storage operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used across the decomposedfs crates.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Errors that can occur while resolving or mutating nodes.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Malformed or absent identifiers.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Missing node or trash entry.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A capability check failed.
    #[error("Permission denied: {what}")]
    PermissionDenied { what: String },

    /// The target of a create or restore already exists.
    #[error("Already exists: {what}")]
    AlreadyExists { what: String },

    /// The operation is not available with the current options.
    #[error("Not supported: {message}")]
    NotSupported { message: String },

    /// Attribute corruption or a broken tree invariant.
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Unexpected filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of a [`StorageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    AlreadyExists,
    NotSupported,
    Internal,
}

impl StorageError {
    /// Create an I/O error with path context.
    ///
    /// A missing path is reported as [`StorageError::NotFound`] so callers
    /// can treat vanished entries as benign.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                what: path.display().to_string(),
            },
            _ => Self::Io { path, source },
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied { what: what.into() }
    }

    pub fn exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Fold the error onto the storage error taxonomy.
    ///
    /// Filesystem failures other than a missing path count as internal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::Internal { .. } | Self::Io { .. } => ErrorKind::Internal,
        }
    }

    /// Check whether this error means "nothing there".
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = StorageError::io(
            "/srv/nodes/abc",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/srv/nodes/abc"));
    }

    #[test]
    fn test_io_other_is_internal() {
        let err = StorageError::io(
            "/srv/nodes/abc",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
