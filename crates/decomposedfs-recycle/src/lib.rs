//! Trash listing, restore and purge for decomposedfs.
//!
//! Deleted nodes keep living in the nodes directory under the name
//! `<id>.T.<deletion time>`. Each caller (or the shared `root` trash when
//! homes are disabled) has a directory of symlinks pointing at them:
//!
//! ```text
//! <root>/trash/<owner>/<id> -> ../../nodes/<id>.T.2024-01-01T00:00:00.000000000Z
//! ```
//!
//! Listings are computed from those links on every call. Restore and purge
//! are prepared by the tree, checked against the permission gate, and only
//! then committed.
//!
//! # Example
//!
//! ```rust,no_run
//! use decomposedfs_core::{Options, RequestContext};
//! use decomposedfs_recycle::Recycle;
//!
//! let recycle = Recycle::open(Options::new("/var/lib/dfs")).unwrap();
//! let ctx = RequestContext::anonymous();
//! for item in recycle.list_recycle(&ctx, "", "/").unwrap() {
//!     println!("{} {}", item.key, item.origin_path);
//! }
//! ```

mod listing;
mod recycle;

pub use listing::RecycleListing;
pub use recycle::Recycle;
