//! Nodes: ID-addressed entities whose metadata lives in attributes.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;

use compact_str::CompactString;
use serde::Serialize;

use decomposedfs_core::{ResourceId, Result, StorageError, UserId, attrs};

use crate::lookup::Lookup;

/// Id of the storage root node.
pub const ROOT_ID: &str = "root";

/// A node of the decomposed tree.
///
/// Nodes are plain data. Parents and children are computed relations that
/// go through a [`Lookup`], never stored references, so a node can be
/// cloned and sent freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Opaque id. Empty for a path segment that does not exist yet.
    pub id: CompactString,

    /// Id of the parent node. Empty only for the storage root.
    pub parent_id: CompactString,

    /// Name within the parent.
    pub name: CompactString,

    /// Owner recorded on the node itself, if any.
    pub owner: Option<UserId>,

    /// Whether a backing object exists.
    pub exists: bool,

    /// Id of the space root governing this node, once discovered.
    pub space_root: Option<CompactString>,
}

impl Node {
    /// Create a node record that has not been read from disk.
    pub fn new(
        id: impl Into<CompactString>,
        parent_id: impl Into<CompactString>,
        name: impl Into<CompactString>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
            owner: None,
            exists: false,
            space_root: None,
        }
    }

    /// A not-yet-created child `name` of `parent`.
    pub fn missing(parent: &Node, name: &str) -> Self {
        Self {
            space_root: parent.space_root.clone(),
            ..Self::new("", parent.id.clone(), name)
        }
    }

    /// The storage root.
    pub fn root() -> Self {
        Self {
            exists: true,
            space_root: Some(ROOT_ID.into()),
            ..Self::new(ROOT_ID, "", "")
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Resource id addressing this node.
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::local(self.id.clone())
    }

    /// Read the node stored under `id` (a node id or a trashed object name).
    ///
    /// A missing backing object yields a node with `exists == false`.
    pub fn read(lu: &Lookup, id: &str) -> Result<Self> {
        if id == ROOT_ID {
            let mut root = Self::root();
            root.owner = read_owner(lu, ROOT_ID)?;
            return Ok(root);
        }

        let mut node = Self::new(id, "", "");
        let path = lu.internal_path(id);
        match fs::symlink_metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(node),
            Err(e) => return Err(StorageError::io(path, e)),
        }

        let store = lu.store();
        node.parent_id = store
            .get_string(id, attrs::PARENT_ID)?
            .ok_or_else(|| StorageError::internal(format!("node {id} has no parent id")))?
            .into();
        node.name = store
            .get_string(id, attrs::NAME)?
            .ok_or_else(|| StorageError::internal(format!("node {id} has no name")))?
            .into();
        node.owner = read_owner(lu, id)?;
        node.exists = true;
        Ok(node)
    }

    /// Resolve the parent node.
    ///
    /// A dangling parent link is an internal error.
    pub fn parent(&self, lu: &Lookup) -> Result<Node> {
        if self.parent_id.is_empty() {
            return Err(StorageError::internal(format!(
                "node {:?} has no parent",
                self.id
            )));
        }
        let parent = Node::read(lu, &self.parent_id)?;
        if !parent.exists {
            return Err(StorageError::internal(format!(
                "parent {} of node {:?} does not exist",
                self.parent_id, self.id
            )));
        }
        Ok(parent)
    }

    /// Resolve the child called `name`.
    ///
    /// A missing child yields a node with `exists == false`.
    pub fn child(&self, lu: &Lookup, name: &str) -> Result<Node> {
        if !self.exists {
            return Ok(Node::missing(self, name));
        }
        let link = lu.internal_path(&self.id).join(name);
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(Node::missing(self, name));
            }
            Err(e) => return Err(StorageError::io(link, e)),
        };
        let child_id = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StorageError::internal(format!("child link {} has no target", link.display()))
            })?;

        let mut child = Node::read(lu, &child_id)?;
        if !child.exists {
            tracing::warn!(link = %link.display(), child = %child_id, "dangling child link");
            return Ok(Node::missing(self, name));
        }
        child.space_root = self.space_root.clone();
        Ok(child)
    }

    /// Whether this node marks the top of a space.
    ///
    /// The storage root always does.
    pub fn is_space_root(&self, lu: &Lookup) -> Result<bool> {
        if self.is_root() {
            return Ok(true);
        }
        if !self.exists {
            return Ok(false);
        }
        Ok(lu
            .store()
            .get_optional(&self.id, attrs::SPACE_NAME)?
            .is_some_and(|name| !name.is_empty()))
    }

    /// The reference target this node redirects to, if any.
    pub fn reference(&self, lu: &Lookup) -> Result<Option<ResourceId>> {
        if !self.exists || self.is_root() {
            return Ok(None);
        }
        match lu.store().get_optional(&self.id, attrs::REFERENCE)? {
            Some(value) => ResourceId::from_reference_attr(&value).map(Some),
            None => Ok(None),
        }
    }

    /// Climb the parent chain and record the governing space root.
    ///
    /// Every live node belongs to exactly one space. A chain that breaks or
    /// loops before reaching one is an internal error.
    pub fn find_space_root(&mut self, lu: &Lookup) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = self.clone();
        loop {
            if current.is_space_root(lu)? {
                self.space_root = Some(current.id);
                return Ok(());
            }
            if !visited.insert(current.id.clone()) {
                return Err(StorageError::internal(format!(
                    "cycle in parent chain of node {} at {}",
                    self.id, current.id
                )));
            }
            if current.parent_id.is_empty() {
                return Err(StorageError::internal(format!(
                    "node {} does not belong to any space",
                    self.id
                )));
            }
            current = current.parent(lu)?;
        }
    }

    /// The owner of this node, inherited from the closest ancestor that
    /// records one.
    pub fn resolve_owner(&self, lu: &Lookup) -> Result<Option<UserId>> {
        let mut visited = HashSet::new();
        let mut current = self.clone();
        loop {
            if let Some(owner) = &current.owner {
                return Ok(Some(owner.clone()));
            }
            if current.parent_id.is_empty() || !visited.insert(current.parent_id.clone()) {
                return Ok(None);
            }
            current = current.parent(lu)?;
        }
    }
}

fn read_owner(lu: &Lookup, object: &str) -> Result<Option<UserId>> {
    let store = lu.store();
    let Some(opaque_id) = store.get_string(object, attrs::OWNER_ID)? else {
        return Ok(None);
    };
    let idp = store.get_string(object, attrs::OWNER_IDP)?.unwrap_or_default();
    Ok(Some(UserId::new(idp, opaque_id)))
}

/// Validate a node name.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".into());
    }

    if name.len() > 255 {
        return Err("Name is too long (max 255 bytes)".into());
    }

    for c in ['/', '\0'] {
        if name.contains(c) {
            return Err(format!("Name cannot contain {c:?}"));
        }
    }

    if name == "." || name == ".." {
        return Err("'.' and '..' are reserved names".into());
    }

    Ok(())
}
