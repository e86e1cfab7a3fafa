//! Attribute store keeping one JSON document per backing object.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::store::{AttrError, AttributeStore};

/// Attribute value as written to the document.
///
/// UTF-8 values are stored as plain strings so documents stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl StoredValue {
    fn encode(value: &[u8]) -> Self {
        match std::str::from_utf8(value) {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Bytes(value.to_vec()),
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

type Document = IndexMap<String, StoredValue>;

/// Stores attributes in `<attrs dir>/<object>.json`.
///
/// Writes go through a temporary file and a rename, so readers never see a
/// half-written document. Writers within one process are serialized.
#[derive(Debug)]
pub struct SidecarStore {
    attrs_dir: PathBuf,
    objects_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SidecarStore {
    /// Create a store writing documents to `attrs_dir` for objects living
    /// in `objects_dir`.
    pub fn new(attrs_dir: impl Into<PathBuf>, objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            attrs_dir: attrs_dir.into(),
            objects_dir: objects_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn document_path(&self, object: &str) -> PathBuf {
        self.attrs_dir.join(format!("{object}.json"))
    }

    fn ensure_object(&self, object: &str) -> Result<(), AttrError> {
        let path = self.objects_dir.join(object);
        match fs::symlink_metadata(&path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AttrError::ObjectNotFound {
                object: object.to_string(),
            }),
            Err(source) => Err(AttrError::Io { path, source }),
        }
    }

    fn load(&self, object: &str) -> Result<Document, AttrError> {
        let path = self.document_path(object);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(source) => return Err(AttrError::Io { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|e| AttrError::Corrupt {
            path,
            message: e.to_string(),
        })
    }

    fn save(&self, object: &str, document: &Document) -> Result<(), AttrError> {
        let path = self.document_path(object);
        if document.is_empty() {
            return remove_if_present(&path);
        }
        fs::create_dir_all(&self.attrs_dir).map_err(|source| AttrError::Io {
            path: self.attrs_dir.clone(),
            source,
        })?;
        let bytes = serde_json::to_vec_pretty(document).map_err(|e| AttrError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|source| AttrError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| AttrError::Io { path, source })
    }

    fn update(
        &self,
        object: &str,
        apply: impl FnOnce(&mut Document),
    ) -> Result<(), AttrError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = self.load(object)?;
        apply(&mut document);
        self.save(object, &document)
    }
}

fn remove_if_present(path: &Path) -> Result<(), AttrError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(AttrError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl AttributeStore for SidecarStore {
    fn get(&self, object: &str, key: &str) -> Result<Vec<u8>, AttrError> {
        match self.load(object)?.shift_remove(key) {
            Some(value) => Ok(value.into_bytes()),
            None => {
                self.ensure_object(object)?;
                Err(AttrError::not_set(object, key))
            }
        }
    }

    fn set(&self, object: &str, key: &str, value: &[u8]) -> Result<(), AttrError> {
        self.ensure_object(object)?;
        self.update(object, |doc| {
            doc.insert(key.to_string(), StoredValue::encode(value));
        })
    }

    fn remove(&self, object: &str, key: &str) -> Result<(), AttrError> {
        self.update(object, |doc| {
            doc.shift_remove(key);
        })
    }

    fn list(&self, object: &str) -> Result<Vec<String>, AttrError> {
        let document = self.load(object)?;
        if document.is_empty() {
            self.ensure_object(object)?;
        }
        Ok(document.into_keys().collect())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), AttrError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let source = self.document_path(from);
        let target = self.document_path(to);
        match fs::rename(&source, &target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AttrError::Io {
                path: source,
                source: e,
            }),
        }
    }

    fn purge(&self, object: &str) -> Result<(), AttrError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        remove_if_present(&self.document_path(object))
    }
}
