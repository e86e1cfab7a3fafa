//! Transformations from logical paths and resource ids to nodes and back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use compact_str::CompactString;
use itertools::Itertools;
use thiserror::Error;

use decomposedfs_core::{Options, Reference, RequestContext, ResourceId, Result, StorageError};
use decomposedfs_xattrs::AttributeStore;

use crate::node::Node;

/// What a single walk step does once a segment has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStep {
    /// Plain node, keep walking.
    Continue,
    /// The node redirects to another node; continue below the target.
    FollowReference(ResourceId),
    /// The node is a space root; it governs the rest of the walk.
    EnterSpace,
}

/// Outcome of a successful walk.
#[derive(Debug, Clone)]
pub struct Walk {
    /// The node addressed by the last segment. May not exist yet.
    pub node: Node,
    /// Id of the space root in effect at the end of the walk.
    pub space_root: Option<CompactString>,
}

/// A walk that stopped early.
///
/// Keeps the last resolved node for diagnostics.
#[derive(Debug, Error)]
#[error("walk stopped at segment {segment:?}: {source}")]
pub struct WalkError {
    pub last: Option<Box<Node>>,
    pub segment: String,
    #[source]
    pub source: StorageError,
}

impl WalkError {
    fn new(last: Option<Node>, segment: &str, source: StorageError) -> Self {
        Self {
            last: last.map(Box::new),
            segment: segment.to_string(),
            source,
        }
    }
}

impl From<WalkError> for StorageError {
    fn from(err: WalkError) -> Self {
        err.source
    }
}

/// Callback invoked with every node resolved during a walk.
pub type Visitor<'a> = &'a mut dyn FnMut(&Node) -> Result<()>;

/// Resolves paths and ids to nodes.
///
/// Cheap to clone; all clones share the options and the attribute store.
#[derive(Debug, Clone)]
pub struct Lookup {
    options: Arc<Options>,
    store: Arc<dyn AttributeStore>,
}

impl Lookup {
    pub fn new(options: Arc<Options>, store: Arc<dyn AttributeStore>) -> Self {
        Self { options, store }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn store(&self) -> &dyn AttributeStore {
        self.store.as_ref()
    }

    /// The internal storage root directory.
    pub fn internal_root(&self) -> &Path {
        &self.options.root
    }

    /// The backing object path for a node id or trashed object name.
    pub fn internal_path(&self, id: &str) -> PathBuf {
        self.options.nodes_dir().join(id)
    }

    /// The root node of the storage.
    pub fn root_node(&self) -> Result<Node> {
        Node::read(self, crate::node::ROOT_ID)
    }

    /// The home node of the calling user.
    pub fn home_node(&self, ctx: &RequestContext) -> Result<Node> {
        if !self.options.enable_home {
            return Err(StorageError::NotSupported {
                message: "home support is disabled".to_string(),
            });
        }
        let user = ctx.require_user()?;
        let root = self.root_node()?;
        let layout = self.options.user_home_path(user);
        let walk = self.walk_path(&root, &layout, false, None)?;
        let mut home = walk.node;
        home.space_root = walk.space_root;
        Ok(home)
    }

    /// The caller's home when homes are enabled, the storage root otherwise.
    pub fn home_or_root_node(&self, ctx: &RequestContext) -> Result<Node> {
        if self.options.enable_home {
            self.home_node(ctx)
        } else {
            self.root_node()
        }
    }

    /// Resolve a reference carrying a resource id, a path, or both.
    pub fn node_from_resource(&self, ctx: &RequestContext, reference: &Reference) -> Result<Node> {
        if let Some(id) = &reference.resource_id {
            let mut node = self.node_from_id(id)?;
            if !reference.path.is_empty() {
                let relative = clean_path(&reference.path);
                if relative == ".." || relative.starts_with("../") {
                    return Err(StorageError::invalid(format!(
                        "relative path {:?} escapes its resource",
                        reference.path
                    )));
                }
                if relative != "." && relative != "/" {
                    let walk = self.walk_path(&node, &relative, false, None)?;
                    node = walk.node;
                    node.space_root = walk.space_root;
                }
            }
            return Ok(node);
        }

        if !reference.path.is_empty() {
            return self.node_from_path(ctx, &reference.path, false);
        }

        Err(StorageError::invalid(
            "invalid reference: at least resource id or path must be set",
        ))
    }

    /// Resolve a logical path below the home-or-root node.
    pub fn node_from_path(
        &self,
        ctx: &RequestContext,
        path: &str,
        follow_references: bool,
    ) -> Result<Node> {
        if path.is_empty() {
            return Err(StorageError::invalid("path must not be empty"));
        }
        tracing::debug!(path, "node_from_path");

        let root = self.home_or_root_node(ctx)?;
        let path = clean_path(&format!("/{path}"));
        if path == "/" {
            let mut node = root;
            if node.space_root.is_none() {
                node.space_root = Some(node.id.clone());
            }
            return Ok(node);
        }

        let mut visit = |n: &Node| -> Result<()> {
            tracing::trace!(id = %n.id, name = %n.name, exists = n.exists, "node_from_path walk");
            Ok(())
        };
        let walk = self.walk_path(&root, &path, follow_references, Some(&mut visit))?;
        let mut node = walk.node;
        node.space_root = walk.space_root;
        Ok(node)
    }

    /// Read a node by id and resolve the space it belongs to.
    pub fn node_from_id(&self, id: &ResourceId) -> Result<Node> {
        let opaque = id.opaque_id.as_str();
        if opaque.is_empty() || opaque.contains('/') || opaque == "." || opaque == ".." {
            return Err(StorageError::not_found(format!("invalid resource id {opaque:?}")));
        }
        let mut node = Node::read(self, opaque)?;
        if !node.exists {
            return Err(StorageError::not_found(format!("node {opaque}")));
        }
        node.find_space_root(self)?;
        Ok(node)
    }

    /// Reconstruct the logical path of `node` relative to the home-or-root
    /// node.
    pub fn path(&self, ctx: &RequestContext, node: &Node) -> Result<String> {
        let root = self.home_or_root_node(ctx)?;
        let mut segments: Vec<CompactString> = Vec::new();
        let mut visited = HashSet::new();
        let mut current = node.clone();

        while current.id != root.id {
            if !visited.insert(current.id.clone()) {
                return Err(StorageError::internal(format!(
                    "cycle in parent chain of node {} at {}",
                    node.id, current.id
                )));
            }
            if current.is_root() {
                return Err(StorageError::internal(format!(
                    "node {} is not below {}",
                    node.id, root.id
                )));
            }
            segments.push(current.name.clone());
            current = current.parent(self).inspect_err(|e| {
                tracing::error!(error = %e, node = %node.id, at = %current.id, "path: broken parent link");
            })?;
        }

        Ok(format!("/{}", segments.iter().rev().join("/")))
    }

    /// Classify a resolved node for the walk loop.
    pub fn step(&self, node: &Node, follow_references: bool) -> Result<WalkStep> {
        if !node.exists {
            return Ok(WalkStep::Continue);
        }
        if follow_references {
            if let Some(target) = node.reference(self)? {
                return Ok(WalkStep::FollowReference(target));
            }
        }
        if node.is_space_root(self)? {
            return Ok(WalkStep::EnterSpace);
        }
        Ok(WalkStep::Continue)
    }

    /// Resolve every segment of `path` starting at `start`.
    ///
    /// Intermediate segments must exist; the last one may not, in which
    /// case the returned node has `exists == false`. With
    /// `follow_references`, reference nodes are replaced by their targets
    /// before the walk continues. The visitor sees every resolved node but
    /// not `start`.
    pub fn walk_path(
        &self,
        start: &Node,
        path: &str,
        follow_references: bool,
        mut visitor: Option<Visitor<'_>>,
    ) -> Result<Walk, WalkError> {
        let mut space_root = match &start.space_root {
            Some(id) => Some(id.clone()),
            None => match start.is_space_root(self) {
                Ok(true) => Some(start.id.clone()),
                Ok(false) => None,
                Err(e) => return Err(WalkError::new(Some(start.clone()), "", e)),
            },
        };

        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            let mut node = start.clone();
            node.space_root = space_root.clone();
            return Ok(Walk { node, space_root });
        }

        let segments: Vec<&str> = trimmed
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let last = segments.len().saturating_sub(1);
        let mut current = start.clone();

        for (i, segment) in segments.iter().enumerate() {
            if *segment == ".." {
                return Err(WalkError::new(
                    Some(current),
                    segment,
                    StorageError::invalid("'..' is not allowed in walked paths"),
                ));
            }

            let mut node = current
                .child(self, segment)
                .map_err(|e| WalkError::new(Some(current.clone()), segment, e))?;

            if !node.exists && i < last {
                return Err(WalkError::new(
                    Some(node),
                    segment,
                    StorageError::not_found(*segment),
                ));
            }

            let mut step = self
                .step(&node, follow_references)
                .map_err(|e| WalkError::new(Some(node.clone()), segment, e))?;
            if let WalkStep::FollowReference(target) = step {
                tracing::trace!(from = %node.id, to = %target.opaque_id, "following reference");
                node = self
                    .node_from_id(&target)
                    .map_err(|e| WalkError::new(Some(node.clone()), segment, e))?;
                space_root = node.space_root.clone();
                step = self
                    .step(&node, false)
                    .map_err(|e| WalkError::new(Some(node.clone()), segment, e))?;
            }
            if step == WalkStep::EnterSpace {
                space_root = Some(node.id.clone());
            }
            node.space_root = space_root.clone();

            if let Some(visit) = visitor.as_deref_mut() {
                visit(&node).map_err(|e| WalkError::new(Some(node.clone()), segment, e))?;
            }
            current = node;
        }

        Ok(Walk {
            node: current,
            space_root,
        })
    }
}

/// Lexically clean a slash separated path.
///
/// Collapses repeated slashes, drops `.` segments, resolves `..` against
/// preceding segments and strips trailing slashes. Rooted paths never climb
/// above `/`. An empty path cleans to `.`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }
    let joined = out.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
