//! The permission oracle consulted by recycle operations.

use std::fmt::Debug;

use decomposedfs_core::{RequestContext, ResourcePermissions, Result};

use crate::lookup::Lookup;
use crate::node::Node;

/// Decides what a caller may do with a node.
pub trait PermissionGate: Send + Sync + Debug {
    /// The full permission set of the caller on `node`.
    fn assemble_permissions(&self, ctx: &RequestContext, node: &Node)
    -> Result<ResourcePermissions>;

    /// Whether the caller's permission set on `node` satisfies `check`.
    fn has_permission(
        &self,
        ctx: &RequestContext,
        node: &Node,
        check: &dyn Fn(&ResourcePermissions) -> bool,
    ) -> Result<bool> {
        Ok(check(&self.assemble_permissions(ctx, node)?))
    }
}

/// Grants owners everything and everybody else nothing.
///
/// The owner of a node is the closest owner recorded on it or its
/// ancestors. With homes disabled, nodes nobody owns get the configured
/// default permissions.
#[derive(Debug, Clone)]
pub struct OwnerGate {
    lookup: Lookup,
}

impl OwnerGate {
    pub fn new(lookup: Lookup) -> Self {
        Self { lookup }
    }
}

impl PermissionGate for OwnerGate {
    fn assemble_permissions(
        &self,
        ctx: &RequestContext,
        node: &Node,
    ) -> Result<ResourcePermissions> {
        let options = self.lookup.options();
        let owner = node.resolve_owner(&self.lookup)?;
        match (ctx.user(), owner) {
            (Some(user), Some(owner)) if owner == user.id => Ok(ResourcePermissions::owner()),
            (_, None) if !options.enable_home => Ok(options.default_permissions),
            _ => {
                tracing::trace!(node = %node.id, "not the owner");
                Ok(ResourcePermissions::none())
            }
        }
    }
}
