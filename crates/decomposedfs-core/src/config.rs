//! Storage configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, StorageError};
use crate::permissions::ResourcePermissions;
use crate::types::User;

/// Where node attributes are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttributeBackend {
    /// One JSON document per backing object under `<root>/attrs`.
    #[default]
    Sidecar,
    /// Native extended attributes on the backing objects.
    Xattr,
    /// Process-local map, for tests and throwaway stores.
    Memory,
}

/// Configuration for a decomposed filesystem.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct Options {
    /// Storage root directory holding `nodes/`, `trash/` and `attrs/`.
    pub root: PathBuf,

    /// Resolve paths relative to the caller's home space.
    #[builder(default = "false")]
    #[serde(default)]
    pub enable_home: bool,

    /// Template for the home path below the storage root.
    ///
    /// Supports the `{id}`, `{idp}` and `{username}` placeholders.
    #[builder(default = "default_user_layout()")]
    #[serde(default = "default_user_layout")]
    pub user_layout: String,

    /// Attribute store backend.
    #[builder(default)]
    #[serde(default)]
    pub attribute_backend: AttributeBackend,

    /// Permissions for unowned nodes and the shared trash when homes are disabled.
    #[builder(default)]
    #[serde(default)]
    pub default_permissions: ResourcePermissions,
}

fn default_user_layout() -> String {
    "{id}".to_string()
}

impl OptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if let Some(ref layout) = self.user_layout {
            if layout.trim_matches('/').is_empty() {
                return Err("User layout cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl Options {
    /// Create a new options builder.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Create options for a storage root with every other setting defaulted.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enable_home: false,
            user_layout: default_user_layout(),
            attribute_backend: AttributeBackend::default(),
            default_permissions: ResourcePermissions::default(),
        }
    }

    /// Load options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        let options: Options = toml::from_str(&text).map_err(|e| {
            StorageError::invalid(format!("invalid config {}: {e}", path.display()))
        })?;
        if options.root.as_os_str().is_empty() {
            return Err(StorageError::invalid("Root path cannot be empty"));
        }
        Ok(options)
    }

    /// Directory holding one backing object per node.
    pub fn nodes_dir(&self) -> PathBuf {
        self.root.join("nodes")
    }

    /// Directory holding the per-owner trash link directories.
    pub fn trash_dir(&self) -> PathBuf {
        self.root.join("trash")
    }

    /// Directory holding sidecar attribute documents.
    pub fn attrs_dir(&self) -> PathBuf {
        self.root.join("attrs")
    }

    /// Expand the user layout for `user`, e.g. `{username}` -> `alice`.
    pub fn user_home_path(&self, user: &User) -> String {
        self.user_layout
            .replace("{id}", &user.id.opaque_id)
            .replace("{idp}", &user.id.idp)
            .replace("{username}", &user.username)
    }
}
