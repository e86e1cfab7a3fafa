//! Attribute store backends for decomposedfs.
//!
//! Node metadata (parent id, name, owner, references, trash origin) lives in
//! key/value attributes attached to each backing object. This crate keeps the
//! node model independent of how those attributes are persisted.
//!
//! # Backends
//!
//! - [`SidecarStore`]: one JSON document per object, works everywhere
//! - [`XattrStore`]: native extended attributes (Linux only)
//! - [`MemoryStore`]: process-local map for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use decomposedfs_core::Options;
//! use decomposedfs_xattrs::open_store;
//!
//! let options = Options::new("/var/lib/dfs");
//! let store = open_store(&options).unwrap();
//! let name = store.get_string("some-node-id", "user.ocis.name").unwrap();
//! ```

mod memory;
#[cfg(target_os = "linux")]
mod native;
mod sidecar;
mod store;

use std::sync::Arc;

use decomposedfs_core::{AttributeBackend, Options, StorageError};

pub use memory::MemoryStore;
#[cfg(target_os = "linux")]
pub use native::XattrStore;
pub use sidecar::SidecarStore;
pub use store::{AttrError, AttributeStore};

/// Open the attribute store selected by `options`.
pub fn open_store(options: &Options) -> Result<Arc<dyn AttributeStore>, StorageError> {
    tracing::debug!(backend = %options.attribute_backend, root = %options.root.display(), "opening attribute store");
    match options.attribute_backend {
        AttributeBackend::Sidecar => Ok(Arc::new(SidecarStore::new(
            options.attrs_dir(),
            options.nodes_dir(),
        ))),
        AttributeBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(target_os = "linux")]
        AttributeBackend::Xattr => Ok(Arc::new(XattrStore::new(options.nodes_dir()))),
        #[cfg(not(target_os = "linux"))]
        AttributeBackend::Xattr => Err(StorageError::NotSupported {
            message: "native extended attributes are only available on Linux".to_string(),
        }),
    }
}
