//! The attribute store abstraction.

use std::fmt::Debug;
use std::path::PathBuf;

use thiserror::Error;

use decomposedfs_core::StorageError;

/// Errors reported by attribute stores.
#[derive(Debug, Error)]
pub enum AttrError {
    /// The object exists but does not carry the attribute.
    #[error("attribute {key} not set on {object}")]
    NotSet { object: String, key: String },

    /// The backing object does not exist.
    #[error("object not found: {object}")]
    ObjectNotFound { object: String },

    /// A stored attribute document could not be decoded.
    #[error("corrupt attribute document {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AttrError {
    pub fn not_set(object: &str, key: &str) -> Self {
        Self::NotSet {
            object: object.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_set(&self) -> bool {
        matches!(self, Self::NotSet { .. })
    }
}

impl From<AttrError> for StorageError {
    fn from(err: AttrError) -> Self {
        match err {
            AttrError::ObjectNotFound { object } => StorageError::not_found(object),
            AttrError::Io { path, source } => StorageError::io(path, source),
            other => StorageError::internal(other.to_string()),
        }
    }
}

/// Key/value attributes attached to backing objects.
///
/// Objects are addressed by their name below the nodes directory: a node id,
/// or `<id>.T.<timestamp>` for trashed nodes.
pub trait AttributeStore: Send + Sync + Debug {
    /// Read one attribute.
    fn get(&self, object: &str, key: &str) -> Result<Vec<u8>, AttrError>;

    /// Write one attribute, replacing any previous value.
    fn set(&self, object: &str, key: &str, value: &[u8]) -> Result<(), AttrError>;

    /// Remove one attribute. Removing an unset attribute is not an error.
    fn remove(&self, object: &str, key: &str) -> Result<(), AttrError>;

    /// Names of all attributes on the object.
    fn list(&self, object: &str) -> Result<Vec<String>, AttrError>;

    /// Carry attributes over after the backing object was renamed.
    fn rename(&self, from: &str, to: &str) -> Result<(), AttrError>;

    /// Drop every attribute of an object that is being destroyed.
    fn purge(&self, object: &str) -> Result<(), AttrError>;

    /// Read one attribute, mapping "not set" to `None`.
    fn get_optional(&self, object: &str, key: &str) -> Result<Option<Vec<u8>>, AttrError> {
        match self.get(object, key) {
            Ok(value) => Ok(Some(value)),
            Err(AttrError::NotSet { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read one attribute as text.
    fn get_string(&self, object: &str, key: &str) -> Result<Option<String>, AttrError> {
        Ok(self
            .get_optional(object, key)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Write several attributes.
    fn set_many(&self, object: &str, values: &[(&str, &[u8])]) -> Result<(), AttrError> {
        for (key, value) in values {
            self.set(object, key, value)?;
        }
        Ok(())
    }
}
