//! Core types and errors for decomposedfs.
//!
//! This crate provides the data structures shared by the attribute store,
//! the node tree and the recycle subsystem: storage options, caller identity,
//! resource addressing, permission sets and trash naming.

pub mod attrs;
mod config;
mod error;
mod permissions;
mod trash;
mod types;

pub use config::{AttributeBackend, Options, OptionsBuilder};
pub use error::{ErrorKind, Result, StorageError};
pub use permissions::ResourcePermissions;
pub use trash::{
    RecycleItem, TRASH_ID_DELIMITER, TrashedName, format_deletion_time, trashed_object_name,
};
pub use types::{Reference, RequestContext, ResourceId, ResourceType, User, UserId};
