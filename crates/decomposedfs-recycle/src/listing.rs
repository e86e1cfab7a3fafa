//! Trash listings.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use decomposedfs_core::{
    RecycleItem, RequestContext, ResourcePermissions, ResourceType, Result, StorageError,
    TrashedName, attrs,
};
use decomposedfs_tree::clean_path;

use crate::recycle::Recycle;

/// Result of a trash listing, with counts of the entries left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecycleListing {
    pub items: Vec<RecycleItem>,
    /// Entries that could not be read: malformed links, vanished objects,
    /// unreadable attributes.
    pub skipped: usize,
    /// Entries owned by somebody else.
    pub filtered: usize,
}

impl RecycleListing {
    fn push(&mut self, item: RecycleItem) {
        self.items.push(item);
    }

    fn sorted(mut self) -> Self {
        self.items.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }
}

/// Why a trash entry did not make it into a listing.
enum Omit {
    Skip,
    Foreign,
}

impl Recycle {
    /// List trash entries.
    ///
    /// An empty key with an empty or `/` relative path lists the whole
    /// trash. Otherwise the addressed entry is listed: a file yields one
    /// item, a container one item per child. Unknown keys list as empty.
    pub fn list_recycle(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
    ) -> Result<Vec<RecycleItem>> {
        Ok(self.list_recycle_report(ctx, key, relative_path)?.items)
    }

    /// Like [`Recycle::list_recycle`], also reporting how many entries were
    /// skipped or filtered out.
    pub fn list_recycle_report(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
    ) -> Result<RecycleListing> {
        let options = self.lookup.options();
        let allowed = if options.enable_home {
            ResourcePermissions::owner().list_container
        } else {
            options.default_permissions.list_container
        };
        if !allowed {
            tracing::debug!(home = options.enable_home, "listing the trash is not permitted");
            return Err(StorageError::denied("trash listing"));
        }

        let listing = if key.is_empty() && matches!(relative_path, "" | "/") {
            self.list_trash_root(ctx)?
        } else {
            self.list_trash_entry(ctx, key, relative_path)?
        };
        Ok(listing.sorted())
    }

    fn list_trash_root(&self, ctx: &RequestContext) -> Result<RecycleListing> {
        let mut listing = RecycleListing::default();
        let trash_root = self.tree.recycle_root(ctx)?;
        let entries = match fs::read_dir(&trash_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(listing),
            Err(e) => return Err(StorageError::io(&trash_root, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&trash_root, e))?;
            match self.root_item(ctx, &entry.path()) {
                Ok(item) => listing.push(item),
                Err(Omit::Skip) => listing.skipped += 1,
                Err(Omit::Foreign) => listing.filtered += 1,
            }
        }
        Ok(listing)
    }

    fn root_item(
        &self,
        ctx: &RequestContext,
        link: &Path,
    ) -> Result<RecycleItem, Omit> {
        let target = fs::read_link(link).map_err(|e| {
            tracing::warn!(link = %link.display(), error = %e, "error reading trash link, skipping");
            Omit::Skip
        })?;
        let object = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let trashed = TrashedName::parse(&object).map_err(|e| {
            tracing::warn!(link = %link.display(), target = %target.display(), error = %e, "malformed trash link, skipping");
            Omit::Skip
        })?;

        let object_path = self.lookup.internal_path(&object);
        let meta = fs::metadata(&object_path).map_err(|e| {
            tracing::warn!(link = %link.display(), object = %object_path.display(), error = %e, "could not stat trash item, skipping");
            Omit::Skip
        })?;

        let store = self.lookup.store();
        let origin = match store.get_string(&object, attrs::TRASH_ORIGIN) {
            Ok(Some(origin)) => origin,
            Ok(None) => {
                tracing::warn!(link = %link.display(), "trash item has no origin path, skipping");
                return Err(Omit::Skip);
            }
            Err(e) => {
                tracing::warn!(link = %link.display(), error = %e, "could not read origin path, skipping");
                return Err(Omit::Skip);
            }
        };
        let owner = store.get_string(&object, attrs::OWNER_ID).map_err(|e| {
            tracing::warn!(link = %link.display(), error = %e, "could not read owner, skipping");
            Omit::Skip
        })?;
        self.filter_owner(ctx, owner.as_deref(), link)?;

        Ok(RecycleItem {
            key: trashed.node_id.to_string(),
            resource_type: ResourceType::from_is_dir(meta.is_dir()),
            size: meta.len(),
            deletion_time: deletion_time(&trashed, link),
            origin_path: origin,
        })
    }

    fn list_trash_entry(
        &self,
        ctx: &RequestContext,
        key: &str,
        relative_path: &str,
    ) -> Result<RecycleListing> {
        let mut listing = RecycleListing::default();
        let rt = match self.tree.read_recycle_item(ctx, key, relative_path) {
            Ok(rt) => rt,
            Err(e) if e.is_not_found() => return Ok(listing),
            Err(e @ StorageError::Internal { .. }) => {
                tracing::warn!(key, error = %e, "unreadable trash item, skipping");
                listing.skipped += 1;
                return Ok(listing);
            }
            Err(e) => return Err(e),
        };

        let owner = rt.node.owner.as_ref().map(|o| o.opaque_id.as_str());
        match self.filter_owner(ctx, owner, &rt.trash_item) {
            Ok(()) => {}
            Err(_) => {
                listing.filtered += 1;
                return Ok(listing);
            }
        }

        let relative = clean_path(&format!("/{relative_path}"));
        let base_key = if relative == "/" {
            key.to_string()
        } else {
            format!("{key}{relative}")
        };
        let deleted = deletion_time(&rt.trashed, &rt.trash_item);
        let object_path = self.lookup.internal_path(&rt.object);
        let meta = fs::metadata(&object_path).map_err(|e| StorageError::io(&object_path, e))?;

        if !meta.is_dir() {
            listing.push(RecycleItem {
                key: base_key,
                resource_type: ResourceType::File,
                size: meta.len(),
                deletion_time: deleted,
                origin_path: rt.origin,
            });
            return Ok(listing);
        }

        let entries = fs::read_dir(&object_path).map_err(|e| StorageError::io(&object_path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&object_path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // follows the child link to the child's backing object
            match fs::metadata(entry.path()) {
                Ok(child) => listing.push(RecycleItem {
                    key: format!("{base_key}/{name}"),
                    resource_type: ResourceType::from_is_dir(child.is_dir()),
                    size: child.len(),
                    deletion_time: deleted,
                    origin_path: clean_path(&format!("{}/{name}", rt.origin)),
                }),
                Err(e) => {
                    tracing::warn!(entry = %entry.path().display(), error = %e, "could not stat trash item, skipping");
                    listing.skipped += 1;
                }
            }
        }
        Ok(listing)
    }

    fn filter_owner(
        &self,
        ctx: &RequestContext,
        owner: Option<&str>,
        link: &Path,
    ) -> Result<(), Omit> {
        if !self.lookup.options().enable_home {
            return Ok(());
        }
        let caller = ctx.user().map(|u| u.id.opaque_id.as_str());
        if owner.is_some() && owner == caller {
            Ok(())
        } else {
            tracing::debug!(link = %link.display(), owner, "trash item not owned by current user, skipping");
            Err(Omit::Foreign)
        }
    }
}

fn deletion_time(trashed: &TrashedName, link: &Path) -> Option<DateTime<Utc>> {
    let time = trashed.deletion_time();
    if time.is_none() {
        tracing::warn!(link = %link.display(), raw = %trashed.raw_time, "could not parse deletion time, ignoring");
    }
    time
}
