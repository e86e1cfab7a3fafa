//! Identity and addressing types shared by the storage crates.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, StorageError};

/// Identity of a user as issued by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId {
    /// Identity provider that issued the id.
    pub idp: String,
    /// Opaque id, unique within the provider.
    pub opaque_id: String,
}

impl UserId {
    pub fn new(idp: impl Into<String>, opaque_id: impl Into<String>) -> Self {
        Self {
            idp: idp.into(),
            opaque_id: opaque_id.into(),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

/// Per-request state produced by the request layer.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    user: Option<User>,
}

impl RequestContext {
    /// A context without an authenticated caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context acting on behalf of `user`.
    pub fn for_user(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// The caller, or an error when the request is anonymous.
    pub fn require_user(&self) -> Result<&User> {
        self.user
            .as_ref()
            .ok_or_else(|| StorageError::invalid("no user in request context"))
    }
}

/// Addresses a node by id, optionally qualified by a storage id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub storage_id: CompactString,
    pub opaque_id: CompactString,
}

/// Scheme prefix of serialized references.
const REFERENCE_SCHEME: &str = "cs3:";

impl ResourceId {
    pub fn new(storage_id: impl Into<CompactString>, opaque_id: impl Into<CompactString>) -> Self {
        Self {
            storage_id: storage_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    /// A resource id for a node of the local storage.
    pub fn local(opaque_id: impl Into<CompactString>) -> Self {
        Self::new("", opaque_id)
    }

    /// Encode as a reference attribute value: `cs3:<storage id>/<opaque id>`.
    pub fn to_reference_attr(&self) -> String {
        format!("{REFERENCE_SCHEME}{}/{}", self.storage_id, self.opaque_id)
    }

    /// Decode a reference attribute value.
    pub fn from_reference_attr(value: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(value)
            .map_err(|_| StorageError::internal("reference attribute is not valid utf-8"))?;
        let rest = text.strip_prefix(REFERENCE_SCHEME).ok_or_else(|| {
            StorageError::internal(format!("reference {text:?} lacks the cs3 scheme"))
        })?;
        let (storage_id, opaque_id) = rest.rsplit_once('/').unwrap_or(("", rest));
        if opaque_id.is_empty() {
            return Err(StorageError::internal(format!(
                "reference {text:?} has no target id"
            )));
        }
        Ok(Self::new(storage_id, opaque_id))
    }
}

/// A request target: a resource id, a path, or a path relative to a resource id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub resource_id: Option<ResourceId>,
    pub path: String,
}

impl Reference {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            resource_id: None,
            path: path.into(),
        }
    }

    pub fn from_id(id: ResourceId) -> Self {
        Self {
            resource_id: Some(id),
            path: String::new(),
        }
    }

    /// A path relative to the node addressed by `id`.
    pub fn relative(id: ResourceId, path: impl Into<String>) -> Self {
        Self {
            resource_id: Some(id),
            path: path.into(),
        }
    }
}

/// Kind of resource backing a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceType {
    File,
    Container,
}

impl ResourceType {
    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir { Self::Container } else { Self::File }
    }
}
