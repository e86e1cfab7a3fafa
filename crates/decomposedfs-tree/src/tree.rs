//! Tree mutations: node creation, move-to-trash, restore and purge.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use compact_str::CompactString;
use serde::Serialize;
use uuid::Uuid;

use decomposedfs_core::{
    RequestContext, ResourceId, ResourceType, Result, StorageError, TrashedName, UserId, attrs,
    trashed_object_name,
};

use crate::lookup::{Lookup, clean_path};
use crate::node::{Node, ROOT_ID, validate_name};

/// Deferred mutation returned by the restore and purge preparations.
///
/// Runs only after the caller has passed its permission checks.
pub type CommitFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Trash directory name used when homes are disabled or no owner is known.
pub const SHARED_TRASH: &str = "root";

/// A resolved trash entry, possibly a node nested below a trashed container.
#[derive(Debug, Clone)]
pub struct RecycleTarget {
    /// The addressed node. Top-level entries carry their original id.
    pub node: Node,
    /// Name of the backing object below the nodes directory.
    pub object: String,
    /// The symlink in the trash directory.
    pub trash_item: PathBuf,
    /// For nested entries, the child link inside the trashed container.
    pub child_link: Option<PathBuf>,
    /// Logical path the addressed node had before deletion.
    pub origin: String,
    /// The decoded trash link target.
    pub trashed: TrashedName,
}

impl RecycleTarget {
    pub fn is_nested(&self) -> bool {
        self.child_link.is_some()
    }
}

/// Summary of a node for display.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub id: CompactString,
    pub name: CompactString,
    pub path: String,
    pub resource_type: ResourceType,
    pub size: u64,
    pub owner: Option<UserId>,
    pub space_root: Option<CompactString>,
    pub reference: Option<ResourceId>,
}

/// Mutating operations on the decomposed tree.
#[derive(Debug, Clone)]
pub struct Tree {
    lookup: Lookup,
}

impl Tree {
    pub fn new(lookup: Lookup) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// Create the storage skeleton. Safe to call on an existing storage.
    pub fn setup(&self) -> Result<()> {
        let options = self.lookup.options();
        for dir in [
            self.lookup.internal_path(ROOT_ID),
            options.trash_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        }
        tracing::info!(root = %options.root.display(), "storage ready");
        Ok(())
    }

    /// Create a container below `parent`.
    pub fn create_dir(&self, ctx: &RequestContext, parent: &Node, name: &str) -> Result<Node> {
        self.create_node(ctx, parent, name, None)
    }

    /// Create a file below `parent` holding `content`.
    pub fn create_file(
        &self,
        ctx: &RequestContext,
        parent: &Node,
        name: &str,
        content: &[u8],
    ) -> Result<Node> {
        self.create_node(ctx, parent, name, Some(content))
    }

    /// Create a container below `parent` and mark it as a space owned by
    /// the caller.
    pub fn create_space(&self, ctx: &RequestContext, parent: &Node, name: &str) -> Result<Node> {
        let owner = ctx.user().map(|u| u.id.clone());
        let mut node = self.create_node(ctx, parent, name, None)?;
        self.mark_space_root(&mut node, name, owner.as_ref())?;
        Ok(node)
    }

    /// Create a node that redirects resolution to `target`.
    pub fn create_reference(
        &self,
        ctx: &RequestContext,
        parent: &Node,
        name: &str,
        target: &ResourceId,
    ) -> Result<Node> {
        let node = self.create_node(ctx, parent, name, None)?;
        self.lookup
            .store()
            .set(&node.id, attrs::REFERENCE, target.to_reference_attr().as_bytes())?;
        tracing::debug!(id = %node.id, target = %target.opaque_id, "created reference");
        Ok(node)
    }

    /// Create the caller's home along the configured user layout.
    ///
    /// Missing intermediate containers are created. The home itself becomes
    /// a space root owned by the caller. Returns the existing home when it
    /// is already there.
    pub fn create_home(&self, ctx: &RequestContext) -> Result<Node> {
        let user = ctx.require_user()?;
        let layout = self.lookup.options().user_home_path(user);
        let mut current = self.lookup.root_node()?;

        for segment in layout.split('/').filter(|s| !s.is_empty()) {
            let child = current.child(&self.lookup, segment)?;
            current = if child.exists {
                child
            } else {
                self.create_node(ctx, &current, segment, None)?
            };
        }

        if !current.is_space_root(&self.lookup)? {
            self.mark_space_root(&mut current, &user.username, Some(&user.id))?;
            tracing::info!(user = %user.username, id = %current.id, "created home");
        }
        current.space_root = Some(current.id.clone());
        Ok(current)
    }

    /// Mark `node` as the root of a space, optionally recording its owner.
    pub fn mark_space_root(
        &self,
        node: &mut Node,
        space_name: &str,
        owner: Option<&UserId>,
    ) -> Result<()> {
        if space_name.is_empty() {
            return Err(StorageError::invalid("space name must not be empty"));
        }
        let store = self.lookup.store();
        store.set(&node.id, attrs::SPACE_NAME, space_name.as_bytes())?;
        if let Some(owner) = owner {
            store.set_many(
                &node.id,
                &[
                    (attrs::OWNER_ID, owner.opaque_id.as_bytes()),
                    (attrs::OWNER_IDP, owner.idp.as_bytes()),
                ],
            )?;
            node.owner = Some(owner.clone());
        }
        node.space_root = Some(node.id.clone());
        Ok(())
    }

    /// Describe a live node.
    pub fn resource_info(&self, ctx: &RequestContext, node: &Node) -> Result<ResourceInfo> {
        if !node.exists {
            return Err(StorageError::not_found(node.name.as_str()));
        }
        let object = self.lookup.internal_path(&node.id);
        let meta = fs::metadata(&object).map_err(|e| StorageError::io(&object, e))?;
        Ok(ResourceInfo {
            id: node.id.clone(),
            name: node.name.clone(),
            path: self.lookup.path(ctx, node)?,
            resource_type: ResourceType::from_is_dir(meta.is_dir()),
            size: if meta.is_dir() { 0 } else { meta.len() },
            owner: node.resolve_owner(&self.lookup)?,
            space_root: node.space_root.clone(),
            reference: node.reference(&self.lookup)?,
        })
    }

    fn create_node(
        &self,
        ctx: &RequestContext,
        parent: &Node,
        name: &str,
        content: Option<&[u8]>,
    ) -> Result<Node> {
        validate_name(name).map_err(StorageError::invalid)?;
        if !parent.exists {
            return Err(StorageError::not_found(parent.name.as_str()));
        }
        let parent_dir = self.lookup.internal_path(&parent.id);
        if !fs::metadata(&parent_dir)
            .map_err(|e| StorageError::io(&parent_dir, e))?
            .is_dir()
        {
            return Err(StorageError::invalid(format!(
                "parent {} is not a container",
                parent.id
            )));
        }
        if parent.child(&self.lookup, name)?.exists {
            return Err(StorageError::exists(name));
        }

        let id = Uuid::new_v4().to_string();
        let object = self.lookup.internal_path(&id);
        let created = match content {
            Some(bytes) => fs::write(&object, bytes),
            None => fs::create_dir(&object),
        };
        created.map_err(|e| StorageError::io(&object, e))?;

        self.lookup.store().set_many(
            &id,
            &[
                (attrs::PARENT_ID, parent.id.as_bytes()),
                (attrs::NAME, name.as_bytes()),
            ],
        )?;

        let link = parent_dir.join(name);
        symlink(&Path::new("..").join(&id), &link)?;

        tracing::debug!(
            id = %id,
            parent = %parent.id,
            name,
            user = ctx.user().map(|u| u.username.as_str()),
            "created node"
        );

        let mut node = Node::read(&self.lookup, &id)?;
        node.space_root = parent.space_root.clone();
        Ok(node)
    }

    /// The trash directory of the caller.
    ///
    /// Fails with InvalidArgument when the caller's id cannot name a
    /// directory below the trash root.
    pub fn recycle_root(&self, ctx: &RequestContext) -> Result<PathBuf> {
        match ctx.user() {
            Some(user) if self.lookup.options().enable_home => self.user_trash_dir(&user.id),
            _ => Ok(self.lookup.options().trash_dir().join(SHARED_TRASH)),
        }
    }

    fn owner_trash_dir(&self, ctx: &RequestContext, owner: Option<&UserId>) -> Result<PathBuf> {
        if !self.lookup.options().enable_home {
            return Ok(self.lookup.options().trash_dir().join(SHARED_TRASH));
        }
        match owner {
            Some(owner) => self.user_trash_dir(owner),
            None => self.recycle_root(ctx),
        }
    }

    fn user_trash_dir(&self, user: &UserId) -> Result<PathBuf> {
        let id = user.opaque_id.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\0') {
            return Err(StorageError::invalid(format!(
                "user id {id:?} cannot name a trash directory"
            )));
        }
        Ok(self.lookup.options().trash_dir().join(id))
    }

    /// Move `node` to the trash and return its trash key.
    ///
    /// Steps, each a single filesystem primitive: record the origin path,
    /// link the trash entry, rename the backing object to
    /// `<id>.T.<timestamp>`, unlink the node from its parent.
    pub fn delete(&self, ctx: &RequestContext, node: &Node) -> Result<String> {
        if !node.exists {
            return Err(StorageError::not_found(node.name.as_str()));
        }
        if node.is_root() {
            return Err(StorageError::invalid("the storage root cannot be deleted"));
        }

        let lu = &self.lookup;
        let store = lu.store();
        let origin = lu.path(ctx, node)?;
        let owner = node
            .resolve_owner(lu)?
            .or_else(|| ctx.user().map(|u| u.id.clone()));

        store.set(&node.id, attrs::TRASH_ORIGIN, origin.as_bytes())?;
        if node.owner.is_none() {
            if let Some(owner) = &owner {
                store.set_many(
                    &node.id,
                    &[
                        (attrs::OWNER_ID, owner.opaque_id.as_bytes()),
                        (attrs::OWNER_IDP, owner.idp.as_bytes()),
                    ],
                )?;
            }
        }

        let trashed = trashed_object_name(&node.id, Utc::now());
        let trash_dir = self.owner_trash_dir(ctx, owner.as_ref())?;
        fs::create_dir_all(&trash_dir).map_err(|e| StorageError::io(&trash_dir, e))?;
        let trash_link = trash_dir.join(node.id.as_str());
        symlink(&Path::new("../../nodes").join(&trashed), &trash_link)?;

        let from = lu.internal_path(&node.id);
        let to = lu.internal_path(&trashed);
        fs::rename(&from, &to).map_err(|e| StorageError::io(&from, e))?;
        store.rename(&node.id, &trashed)?;

        let child_link = lu.internal_path(&node.parent_id).join(node.name.as_str());
        remove_file_if_present(&child_link)?;

        tracing::info!(id = %node.id, origin = %origin, trash = %trash_link.display(), "moved to trash");
        Ok(node.id.to_string())
    }

    /// Locate the trash link for `key`: a link named by the key, or one
    /// named `<key>.T.<timestamp>`.
    fn find_trash_link(&self, ctx: &RequestContext, key: &str) -> Result<(PathBuf, PathBuf)> {
        let dir = self.recycle_root(ctx)?;
        let link = dir.join(key);
        match fs::read_link(&link) {
            Ok(target) => return Ok((link, target)),
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(StorageError::io(&link, e)),
            Err(_) => {}
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => return Err(StorageError::io(&dir, e)),
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let matches = TrashedName::parse(&name.to_string_lossy())
                .is_ok_and(|trashed| trashed.node_id == key);
            if matches {
                let link = entry.path();
                let target = fs::read_link(&link).map_err(|e| StorageError::io(&link, e))?;
                return Ok((link, target));
            }
        }
        Err(StorageError::not_found(key))
    }

    /// Resolve a trash key and an optional path below it.
    pub fn read_recycle_item(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
    ) -> Result<RecycleTarget> {
        if key.is_empty() {
            return Err(StorageError::invalid("missing trash key"));
        }
        if key.contains('/') || key == "." || key == ".." {
            return Err(StorageError::not_found(key));
        }

        let lu = &self.lookup;
        let (trash_item, target) = self.find_trash_link(ctx, key)?;
        let object = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StorageError::internal(format!("trash link {} has no target", trash_item.display()))
            })?;
        let trashed = TrashedName::parse(&object)?;

        let mut top = Node::read(lu, &object)?;
        if !top.exists {
            return Err(StorageError::not_found(key));
        }
        let origin = lu
            .store()
            .get_string(&object, attrs::TRASH_ORIGIN)?
            .ok_or_else(|| StorageError::internal(format!("trash item {key} has no origin path")))?;

        let relative = clean_path(&format!("/{relative_path}"));
        if relative == "/" {
            top.id = trashed.node_id.clone();
            return Ok(RecycleTarget {
                node: top,
                object,
                trash_item,
                child_link: None,
                origin,
                trashed,
            });
        }

        let (parent_rel, leaf) = split_parent(&relative)?;
        let parent = lu.walk_path(&top, &parent_rel, false, None)?.node;
        let mut node = parent.child(lu, &leaf)?;
        if !node.exists {
            return Err(StorageError::not_found(format!("{key}{relative}")));
        }
        if node.owner.is_none() {
            node.owner = top.owner.clone();
        }
        Ok(RecycleTarget {
            object: node.id.to_string(),
            child_link: Some(lu.internal_path(&parent.id).join(&leaf)),
            node,
            trash_item,
            origin: clean_path(&format!("{origin}{relative}")),
            trashed,
        })
    }

    /// Prepare restoring a trash entry.
    ///
    /// Returns the trashed node, the destination parent and the commit. The
    /// destination is `target_path` or, when absent, the recorded origin.
    pub fn restore_recycle_item_func(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
        target_path: Option<&str>,
    ) -> Result<(Node, Node, CommitFn)> {
        let rt = self.read_recycle_item(ctx, key, relative_path)?;
        let destination = clean_path(&format!("/{}", target_path.unwrap_or(&rt.origin)));
        let (parent_path, name) = split_parent(&destination)?;
        validate_name(&name).map_err(StorageError::invalid)?;

        let parent = self.lookup.node_from_path(ctx, &parent_path, false)?;
        if !parent.exists {
            return Err(StorageError::not_found(parent_path));
        }
        if parent.child(&self.lookup, &name)?.exists {
            return Err(StorageError::exists(destination));
        }

        let lu = self.lookup.clone();
        let node = rt.node.clone();
        let dest = parent.clone();
        let commit: CommitFn = Box::new(move || {
            let link = lu.internal_path(&dest.id).join(&name);
            if fs::symlink_metadata(&link).is_ok() {
                return Err(StorageError::exists(link.display().to_string()));
            }

            let id = rt.node.id.to_string();
            let store = lu.store();
            if rt.is_nested() {
                if let Some(child_link) = &rt.child_link {
                    fs::remove_file(child_link).map_err(|e| StorageError::io(child_link, e))?;
                }
            } else {
                let from = lu.internal_path(&rt.object);
                let to = lu.internal_path(&id);
                fs::rename(&from, &to).map_err(|e| StorageError::io(&from, e))?;
                store.rename(&rt.object, &id)?;
            }

            store.set_many(
                &id,
                &[
                    (attrs::PARENT_ID, dest.id.as_bytes()),
                    (attrs::NAME, name.as_bytes()),
                ],
            )?;
            store.remove(&id, attrs::TRASH_ORIGIN)?;
            symlink(&Path::new("..").join(&id), &link)?;

            if !rt.is_nested() {
                remove_file_if_present(&rt.trash_item)?;
            }
            tracing::info!(id = %id, parent = %dest.id, name = %name, "restored from trash");
            Ok(())
        });

        Ok((node, parent, commit))
    }

    /// Prepare purging a trash entry for good.
    pub fn purge_recycle_item_func(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
    ) -> Result<(Node, CommitFn)> {
        let rt = self.read_recycle_item(ctx, key, relative_path)?;
        let tree = self.clone();
        let node = rt.node.clone();
        let commit: CommitFn = Box::new(move || {
            let purged = tree.purge_object(&rt.object)?;
            match &rt.child_link {
                Some(link) => remove_file_if_present(link)?,
                None => remove_file_if_present(&rt.trash_item)?,
            }
            tracing::info!(key = %rt.trashed.node_id, objects = purged, "purged from trash");
            Ok(())
        });
        Ok((node, commit))
    }

    /// Remove a backing object, all objects reachable through its child
    /// links, and their attributes. Returns the number of objects removed.
    pub fn purge_object(&self, object: &str) -> Result<usize> {
        let lu = &self.lookup;
        let mut pending = vec![object.to_string()];
        let mut visited = HashSet::new();
        let mut removed = 0;

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let path = lu.internal_path(&current);
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&path, e)),
            };

            if meta.is_dir() {
                let entries = fs::read_dir(&path).map_err(|e| StorageError::io(&path, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| StorageError::io(&path, e))?;
                    match fs::read_link(entry.path()) {
                        Ok(target) => {
                            if let Some(child) = target.file_name() {
                                pending.push(child.to_string_lossy().into_owned());
                            }
                        }
                        Err(e) => {
                            tracing::warn!(entry = %entry.path().display(), error = %e, "not a child link");
                        }
                    }
                }
                fs::remove_dir_all(&path).map_err(|e| StorageError::io(&path, e))?;
            } else {
                fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
            }
            lu.store().purge(&current)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Purge every entry of the caller's trash and remove the trash
    /// directory. Entries that cannot be purged are logged and skipped.
    pub fn empty_trash_dir(&self, ctx: &RequestContext) -> Result<usize> {
        let dir = self.recycle_root(ctx)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&dir, e)),
        };

        let mut purged = 0;
        for entry in entries.flatten() {
            let link = entry.path();
            let object = match fs::read_link(&link) {
                Ok(target) => target.file_name().map(|n| n.to_string_lossy().into_owned()),
                Err(e) => {
                    tracing::warn!(link = %link.display(), error = %e, "skipping trash entry");
                    None
                }
            };
            if let Some(object) = object {
                match self.purge_object(&object) {
                    Ok(n) => purged += n,
                    Err(e) => tracing::warn!(object = %object, error = %e, "failed to purge trashed object"),
                }
            }
        }

        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&dir, e)),
        }
        tracing::info!(trash = %dir.display(), objects = purged, "emptied trash");
        Ok(purged)
    }
}

/// Split a cleaned absolute path into its parent path and final segment.
fn split_parent(path: &str) -> Result<(String, String)> {
    match path.rsplit_once('/') {
        Some((_, "")) | None => Err(StorageError::invalid(format!(
            "path {path:?} has no final segment"
        ))),
        Some(("", leaf)) => Ok(("/".to_string(), leaf.to_string())),
        Some((parent, leaf)) => Ok((parent.to_string(), leaf.to_string())),
    }
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => StorageError::exists(link.display().to_string()),
        _ => StorageError::io(link, e),
    })
}

#[cfg(not(unix))]
fn symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(StorageError::io(
        link,
        std::io::Error::new(ErrorKind::Unsupported, "symlinks are required"),
    ))
}
