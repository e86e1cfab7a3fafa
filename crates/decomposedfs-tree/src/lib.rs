//! Node model, path lookup and tree mutations for decomposedfs.
//!
//! A decomposed tree stores every file and container as a flat backing
//! object under `<root>/nodes/<id>`. Names, parent links, owners, space
//! markers and references are attributes on those objects; children are
//! symlinks `nodes/<parent>/<name> -> ../<child>`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use decomposedfs_core::{Options, RequestContext};
//! use decomposedfs_tree::{Lookup, Tree};
//! use decomposedfs_xattrs::open_store;
//!
//! let options = Arc::new(Options::new("/var/lib/dfs"));
//! let store = open_store(&options).unwrap();
//! let lookup = Lookup::new(options, store);
//! let tree = Tree::new(lookup.clone());
//! tree.setup().unwrap();
//!
//! let ctx = RequestContext::anonymous();
//! let root = lookup.root_node().unwrap();
//! let docs = tree.create_dir(&ctx, &root, "docs").unwrap();
//! assert_eq!(lookup.path(&ctx, &docs).unwrap(), "/docs");
//! ```

mod lookup;
mod node;
mod permissions;
mod tree;

pub use lookup::{Lookup, Visitor, Walk, WalkError, WalkStep, clean_path};
pub use node::{Node, ROOT_ID, validate_name};
pub use permissions::{OwnerGate, PermissionGate};
pub use tree::{CommitFn, RecycleTarget, ResourceInfo, SHARED_TRASH, Tree};
