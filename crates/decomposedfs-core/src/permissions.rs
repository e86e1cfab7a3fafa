//! Permission sets handed out by a permission gate.

use serde::{Deserialize, Serialize};

/// The capabilities a caller holds on a node.
///
/// `Default` grants nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePermissions {
    pub stat: bool,
    pub get_path: bool,
    pub list_container: bool,
    pub create_container: bool,
    pub initiate_file_download: bool,
    pub initiate_file_upload: bool,
    pub delete: bool,
    pub r#move: bool,
    pub list_recycle: bool,
    pub restore_recycle_item: bool,
    pub purge_recycle: bool,
}

impl ResourcePermissions {
    /// No permissions at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Everything an owner may do with their own nodes.
    pub fn owner() -> Self {
        Self {
            stat: true,
            get_path: true,
            list_container: true,
            create_container: true,
            initiate_file_download: true,
            initiate_file_upload: true,
            delete: true,
            r#move: true,
            list_recycle: true,
            restore_recycle_item: true,
            purge_recycle: true,
        }
    }

    /// Read-only access.
    pub fn viewer() -> Self {
        Self {
            stat: true,
            get_path: true,
            list_container: true,
            initiate_file_download: true,
            ..Self::default()
        }
    }
}
