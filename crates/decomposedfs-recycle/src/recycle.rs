//! Restore, purge and empty operations on the trash.

use std::sync::Arc;

use decomposedfs_core::{
    Options, Reference, RequestContext, ResourcePermissions, Result, StorageError,
};
use decomposedfs_tree::{Lookup, Node, OwnerGate, PermissionGate, Tree};
use decomposedfs_xattrs::open_store;

/// The recycle subsystem.
///
/// Resolution and mutation are delegated to the [`Tree`]; every restore or
/// purge consults the [`PermissionGate`] before its commit runs.
#[derive(Debug, Clone)]
pub struct Recycle {
    pub(crate) lookup: Lookup,
    pub(crate) tree: Tree,
    gate: Arc<dyn PermissionGate>,
}

impl Recycle {
    pub fn new(tree: Tree, gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            lookup: tree.lookup().clone(),
            tree,
            gate,
        }
    }

    /// Open a storage with the configured attribute backend and the
    /// owner-based permission gate.
    pub fn open(options: Options) -> Result<Self> {
        let options = Arc::new(options);
        let store = open_store(&options)?;
        let lookup = Lookup::new(options, store);
        let gate = Arc::new(OwnerGate::new(lookup.clone()));
        Ok(Self::new(Tree::new(lookup), gate))
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Restore a trash entry to its origin or to `target`.
    ///
    /// Needs `restore_recycle_item` on the trashed node and
    /// `initiate_file_upload` on the destination container.
    pub fn restore_recycle_item(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
        target: Option<&Reference>,
    ) -> Result<()> {
        let target_path = match target {
            Some(reference) => Some(self.target_path(ctx, reference)?),
            None => None,
        };
        let (trashed, destination, commit) = self.tree.restore_recycle_item_func(
            ctx,
            key,
            relative_path,
            target_path.as_deref(),
        )?;

        self.require(ctx, &trashed, key, &|p: &ResourcePermissions| p.restore_recycle_item)?;
        let on_destination = self
            .gate
            .assemble_permissions(ctx, &destination)
            .map_err(|e| StorageError::internal(e.to_string()))?;
        if !on_destination.initiate_file_upload {
            tracing::debug!(key, destination = %destination.id, "no write access to restore target");
            return Err(StorageError::denied(key));
        }

        commit()
    }

    /// Remove a trash entry for good.
    ///
    /// Needs `purge_recycle` on the trashed node.
    pub fn purge_recycle_item(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
    ) -> Result<()> {
        let (trashed, commit) = self.tree.purge_recycle_item_func(ctx, key, relative_path)?;
        self.require(ctx, &trashed, key, &|p: &ResourcePermissions| p.purge_recycle)?;
        commit()
    }

    /// Empty the caller's trash, or the shared trash for anonymous callers.
    pub fn empty_recycle(&self, ctx: &RequestContext) -> Result<()> {
        let purged = self.tree.empty_trash_dir(ctx)?;
        tracing::debug!(objects = purged, "empty_recycle");
        Ok(())
    }

    fn require(
        &self,
        ctx: &RequestContext,
        node: &Node,
        key: &str,
        check: &dyn Fn(&ResourcePermissions) -> bool,
    ) -> Result<()> {
        match self.gate.has_permission(ctx, node, check) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StorageError::denied(key)),
            Err(e) => Err(StorageError::internal(e.to_string())),
        }
    }

    fn target_path(&self, ctx: &RequestContext, reference: &Reference) -> Result<String> {
        if reference.resource_id.is_none() {
            return Ok(reference.path.clone());
        }
        let node = self.lookup.node_from_resource(ctx, reference)?;
        self.lookup.path(ctx, &node)
    }
}
