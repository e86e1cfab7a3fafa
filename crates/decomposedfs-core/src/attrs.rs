//! Names of the attributes stored on backing objects.

/// Common prefix of every decomposedfs attribute.
pub const PREFIX: &str = "user.ocis.";

/// Id of the parent node.
pub const PARENT_ID: &str = "user.ocis.parentid";
/// Name of the node within its parent.
pub const NAME: &str = "user.ocis.name";
/// Opaque id of the owner.
pub const OWNER_ID: &str = "user.ocis.owner.id";
/// Identity provider of the owner.
pub const OWNER_IDP: &str = "user.ocis.owner.idp";
/// Present and non-empty on space roots.
pub const SPACE_NAME: &str = "user.ocis.space.name";
/// Reference target, encoded as `cs3:<storage id>/<opaque id>`.
pub const REFERENCE: &str = "user.ocis.cs3.ref";
/// Logical path a trashed node had before deletion.
pub const TRASH_ORIGIN: &str = "user.ocis.trash.origin";
