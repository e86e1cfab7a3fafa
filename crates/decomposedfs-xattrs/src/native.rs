//! Attribute store backed by Linux extended attributes.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::store::{AttrError, AttributeStore};

/// Reads and writes `user.*` extended attributes directly on the backing
/// objects. Symlinks are not followed.
///
/// Attributes live on the inode, so renames carry them along and removing
/// the object removes them.
#[derive(Debug, Clone)]
pub struct XattrStore {
    objects_dir: PathBuf,
}

impl XattrStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    fn object_path(&self, object: &str) -> PathBuf {
        self.objects_dir.join(object)
    }
}

fn c_path(path: &Path) -> Result<CString, AttrError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| AttrError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"),
    })
}

fn c_name(path: &Path, key: &str) -> Result<CString, AttrError> {
    CString::new(key).map_err(|_| AttrError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "attribute name contains NUL"),
    })
}

fn classify(object: &str, key: &str, path: &Path, err: io::Error) -> AttrError {
    match err.raw_os_error() {
        Some(libc::ENODATA) => AttrError::not_set(object, key),
        Some(libc::ENOENT) => AttrError::ObjectNotFound {
            object: object.to_string(),
        },
        _ => AttrError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    }
}

impl AttributeStore for XattrStore {
    fn get(&self, object: &str, key: &str) -> Result<Vec<u8>, AttrError> {
        let path = self.object_path(object);
        let cpath = c_path(&path)?;
        let cname = c_name(&path, key)?;
        loop {
            // SAFETY: both strings are NUL terminated; a null buffer with
            // size 0 asks for the value length only.
            let len = unsafe {
                libc::lgetxattr(cpath.as_ptr(), cname.as_ptr(), std::ptr::null_mut(), 0)
            };
            if len < 0 {
                return Err(classify(object, key, &path, io::Error::last_os_error()));
            }
            let mut buf = vec![0u8; len as usize];
            // SAFETY: `buf` is valid for `buf.len()` bytes.
            let read = unsafe {
                libc::lgetxattr(
                    cpath.as_ptr(),
                    cname.as_ptr(),
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                )
            };
            if read < 0 {
                let err = io::Error::last_os_error();
                // value grew between the two calls
                if err.raw_os_error() == Some(libc::ERANGE) {
                    continue;
                }
                return Err(classify(object, key, &path, err));
            }
            buf.truncate(read as usize);
            return Ok(buf);
        }
    }

    fn set(&self, object: &str, key: &str, value: &[u8]) -> Result<(), AttrError> {
        let path = self.object_path(object);
        let cpath = c_path(&path)?;
        let cname = c_name(&path, key)?;
        // SAFETY: `value` is valid for `value.len()` bytes.
        let rc = unsafe {
            libc::lsetxattr(
                cpath.as_ptr(),
                cname.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
            )
        };
        if rc < 0 {
            return Err(classify(object, key, &path, io::Error::last_os_error()));
        }
        Ok(())
    }

    fn remove(&self, object: &str, key: &str) -> Result<(), AttrError> {
        let path = self.object_path(object);
        let cpath = c_path(&path)?;
        let cname = c_name(&path, key)?;
        // SAFETY: both strings are NUL terminated.
        let rc = unsafe { libc::lremovexattr(cpath.as_ptr(), cname.as_ptr()) };
        if rc < 0 {
            return match classify(object, key, &path, io::Error::last_os_error()) {
                AttrError::NotSet { .. } => Ok(()),
                err => Err(err),
            };
        }
        Ok(())
    }

    fn list(&self, object: &str) -> Result<Vec<String>, AttrError> {
        let path = self.object_path(object);
        let cpath = c_path(&path)?;
        loop {
            // SAFETY: null buffer with size 0 queries the list length.
            let len = unsafe { libc::llistxattr(cpath.as_ptr(), std::ptr::null_mut(), 0) };
            if len < 0 {
                return Err(classify(object, "", &path, io::Error::last_os_error()));
            }
            let mut buf = vec![0u8; len as usize];
            // SAFETY: `buf` is valid for `buf.len()` bytes.
            let read =
                unsafe { libc::llistxattr(cpath.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
            if read < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ERANGE) {
                    continue;
                }
                return Err(classify(object, "", &path, err));
            }
            buf.truncate(read as usize);
            return Ok(buf
                .split(|b| *b == 0)
                .filter(|name| !name.is_empty())
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect());
        }
    }

    fn rename(&self, _from: &str, _to: &str) -> Result<(), AttrError> {
        Ok(())
    }

    fn purge(&self, _object: &str) -> Result<(), AttrError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_when_supported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("n1"), b"").unwrap();
        let store = XattrStore::new(dir.path());

        match store.set("n1", "user.ocis.name", b"docs") {
            Ok(()) => {}
            // tmpfs and some container filesystems reject user xattrs
            Err(AttrError::Io { .. }) => return,
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert_eq!(store.get("n1", "user.ocis.name").unwrap(), b"docs");
        assert!(store.list("n1").unwrap().contains(&"user.ocis.name".to_string()));

        store.remove("n1", "user.ocis.name").unwrap();
        assert!(store.get("n1", "user.ocis.name").unwrap_err().is_not_set());
        assert!(matches!(
            store.get("ghost", "user.ocis.name"),
            Err(AttrError::ObjectNotFound { .. })
        ));
    }
}
