use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use decomposedfs_core::{
    ErrorKind, Options, Reference, RequestContext, ResourcePermissions, ResourceType, Result,
    StorageError, User, UserId, attrs,
};
use decomposedfs_recycle::Recycle;
use decomposedfs_tree::{Node, PermissionGate};
use tempfile::TempDir;

fn storage(enable_home: bool, default_permissions: ResourcePermissions) -> (TempDir, Recycle) {
    let dir = TempDir::new().unwrap();
    let options = Options::builder()
        .root(dir.path())
        .enable_home(enable_home)
        .default_permissions(default_permissions)
        .build()
        .unwrap();
    let recycle = Recycle::open(options).unwrap();
    recycle.tree().setup().unwrap();
    (dir, recycle)
}

fn shared_storage() -> (TempDir, Recycle) {
    storage(
        false,
        ResourcePermissions {
            list_container: true,
            ..ResourcePermissions::none()
        },
    )
}

fn user(name: &str) -> RequestContext {
    RequestContext::for_user(User::new(UserId::new("https://idp", format!("{name}-id")), name))
}

/// Lay down a trash entry by hand, the way a deletion leaves it.
fn plant_trash_item(
    root: &Path,
    recycle: &Recycle,
    trash: &str,
    id: &str,
    timestamp: &str,
    size: usize,
    owner: &str,
) {
    plant_trash_link(root, recycle, trash, id, id, timestamp, size, owner);
}

#[allow(clippy::too_many_arguments)]
fn plant_trash_link(
    root: &Path,
    recycle: &Recycle,
    trash: &str,
    link_name: &str,
    id: &str,
    timestamp: &str,
    size: usize,
    owner: &str,
) {
    let object = format!("{id}.T.{timestamp}");
    fs::write(root.join("nodes").join(&object), vec![b'x'; size]).unwrap();
    let store = recycle.lookup().store();
    let name = format!("{id}.pdf");
    store
        .set_many(
            &object,
            &[
                (attrs::PARENT_ID, b"root".as_slice()),
                (attrs::NAME, name.as_bytes()),
                (attrs::TRASH_ORIGIN, format!("/{name}").as_bytes()),
                (attrs::OWNER_ID, owner.as_bytes()),
                (attrs::OWNER_IDP, b"https://idp".as_slice()),
            ],
        )
        .unwrap();

    let dir = root.join("trash").join(trash);
    fs::create_dir_all(&dir).unwrap();
    std::os::unix::fs::symlink(format!("../../nodes/{object}"), dir.join(link_name)).unwrap();
}

#[derive(Debug, Default)]
struct GrantGate {
    grants: HashMap<String, ResourcePermissions>,
    offline: bool,
}

impl GrantGate {
    fn grant(mut self, node: &Node, permissions: ResourcePermissions) -> Self {
        self.grants.insert(node.id.to_string(), permissions);
        self
    }
}

impl PermissionGate for GrantGate {
    fn assemble_permissions(&self, _ctx: &RequestContext, node: &Node) -> Result<ResourcePermissions> {
        if self.offline {
            return Err(StorageError::internal("permission service offline"));
        }
        Ok(self.grants.get(node.id.as_str()).copied().unwrap_or_default())
    }
}

#[test]
fn test_list_owned_item() {
    let (dir, recycle) = storage(true, ResourcePermissions::none());
    let ts = "2024-01-01T00:00:00.000000000Z";
    plant_trash_item(dir.path(), &recycle, "alice-id", "abc123", ts, 42, "alice-id");

    let items = recycle.list_recycle(&user("alice"), "", "/").unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.key, "abc123");
    assert_eq!(item.size, 42);
    assert_eq!(item.resource_type, ResourceType::File);
    assert_eq!(item.deletion_seconds(), Some(1_704_067_200));
    assert_eq!(item.origin_path, "/abc123.pdf");
}

#[test]
fn test_owner_filter_hides_items_in_callers_trash() {
    let (dir, recycle) = storage(true, ResourcePermissions::none());
    let ts = "2024-01-01T00:00:00.000000000Z";
    plant_trash_item(dir.path(), &recycle, "bob-id", "abc123", ts, 42, "alice-id");

    let report = recycle.list_recycle_report(&user("bob"), "", "/").unwrap();
    assert!(report.items.is_empty());
    assert_eq!(report.filtered, 1);

    let report = recycle
        .list_recycle_report(&user("bob"), "abc123", "/")
        .unwrap();
    assert!(report.items.is_empty());
    assert_eq!(report.filtered, 1);
}

#[test]
fn test_link_named_by_trashed_object() {
    let (dir, recycle) = storage(true, ResourcePermissions::none());
    let ts = "2024-01-01T00:00:00.000000000Z";
    let link = format!("abc123.T.{ts}");
    plant_trash_link(dir.path(), &recycle, "alice-id", &link, "abc123", ts, 42, "alice-id");

    let items = recycle.list_recycle(&user("alice"), "", "/").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, "abc123");
    assert_eq!(items[0].size, 42);
    assert_eq!(items[0].deletion_seconds(), Some(1_704_067_200));

    let single = recycle.list_recycle(&user("alice"), "abc123", "/").unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].key, "abc123");

    recycle.purge_recycle_item(&user("alice"), "abc123", "").unwrap();
    assert!(!dir.path().join("trash/alice-id").join(&link).exists());
    assert!(!dir.path().join("nodes").join(&link).exists());
    assert!(recycle.list_recycle(&user("alice"), "", "/").unwrap().is_empty());
}

#[test]
fn test_entry_without_origin_is_skipped() {
    let (dir, recycle) = shared_storage();
    let ctx = RequestContext::anonymous();
    let ts = "2024-01-01T00:00:00.000000000Z";
    plant_trash_item(dir.path(), &recycle, "root", "lost", ts, 5, "u");
    plant_trash_item(dir.path(), &recycle, "root", "kept", ts, 5, "u");
    recycle
        .lookup()
        .store()
        .remove(&format!("lost.T.{ts}"), attrs::TRASH_ORIGIN)
        .unwrap();

    let report = recycle.list_recycle_report(&ctx, "", "/").unwrap();
    let keys: Vec<_> = report.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["kept"]);
    assert_eq!(report.skipped, 1);

    let report = recycle.list_recycle_report(&ctx, "lost", "/").unwrap();
    assert!(report.items.is_empty());
    assert_eq!(report.skipped, 1);

    let err = recycle.restore_recycle_item(&ctx, "lost", "", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!dir.path().join("nodes/root/lost.pdf").exists());
}

#[test]
fn test_shared_restore_round_trip() {
    let (_dir, recycle) = storage(
        false,
        ResourcePermissions {
            list_container: true,
            initiate_file_upload: true,
            restore_recycle_item: true,
            purge_recycle: true,
            ..ResourcePermissions::none()
        },
    );
    let alice = user("alice");
    let anonymous = RequestContext::anonymous();
    let tree = recycle.tree();
    let root = recycle.lookup().root_node().unwrap();

    let file = tree.create_file(&alice, &root, "a.txt", b"abc").unwrap();
    let key = tree.delete(&alice, &file).unwrap();
    recycle.restore_recycle_item(&alice, &key, "", None).unwrap();
    let restored = recycle
        .lookup()
        .node_from_path(&alice, "/a.txt", false)
        .unwrap();
    assert_eq!(restored.id, file.id);

    let other = tree.create_file(&anonymous, &root, "b.txt", b"b").unwrap();
    let key = tree.delete(&anonymous, &other).unwrap();
    recycle.restore_recycle_item(&anonymous, &key, "", None).unwrap();
    let key = tree.delete(&anonymous, &other).unwrap();
    recycle.purge_recycle_item(&anonymous, &key, "").unwrap();
    assert!(recycle.list_recycle(&anonymous, "", "/").unwrap().is_empty());
}

#[test]
fn test_shared_restore_needs_default_upload() {
    let (_dir, recycle) = shared_storage();
    let alice = user("alice");
    let root = recycle.lookup().root_node().unwrap();
    let file = recycle.tree().create_file(&alice, &root, "a.txt", b"abc").unwrap();
    let key = recycle.tree().delete(&alice, &file).unwrap();

    let err = recycle.restore_recycle_item(&alice, &key, "", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(recycle.list_recycle(&alice, "", "/").unwrap().len(), 1);
}

#[test]
fn test_empty_recycle_rejects_unsafe_user_id() {
    let (dir, recycle) = storage(true, ResourcePermissions::none());
    let alice = user("alice");
    let home = recycle.tree().create_home(&alice).unwrap();
    recycle.tree().create_file(&alice, &home, "a.txt", b"abc").unwrap();

    for id in ["..", ".", "", "../nodes"] {
        let ctx = RequestContext::for_user(User::new(UserId::new("https://idp", id), "mallory"));
        let err = recycle.empty_recycle(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{id:?}");
        let err = recycle.list_recycle(&ctx, "", "/").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{id:?}");
    }

    assert!(dir.path().join("nodes").is_dir());
    assert!(
        recycle
            .lookup()
            .node_from_path(&alice, "/a.txt", false)
            .unwrap()
            .exists
    );
}

#[test]
fn test_foreign_items_are_filtered() {
    let (dir, recycle) = storage(true, ResourcePermissions::none());
    let ts = "2024-01-01T00:00:00.000000000Z";
    plant_trash_item(dir.path(), &recycle, "alice-id", "mine", ts, 1, "alice-id");
    plant_trash_item(dir.path(), &recycle, "alice-id", "theirs", ts, 1, "bob-id");

    let report = recycle.list_recycle_report(&user("alice"), "", "").unwrap();
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].key, "mine");
    assert_eq!(report.filtered, 1);
    assert_eq!(report.skipped, 0);
}

#[test]
fn test_malformed_link_is_skipped() {
    let (dir, recycle) = shared_storage();
    let ctx = RequestContext::anonymous();
    let ts = "2024-01-01T00:00:00.000000000Z";
    plant_trash_item(dir.path(), &recycle, "root", "one", ts, 1, "u");
    plant_trash_item(dir.path(), &recycle, "root", "two", ts, 2, "u");
    fs::write(dir.path().join("nodes/plain"), b"").unwrap();
    std::os::unix::fs::symlink("../../nodes/plain", dir.path().join("trash/root/plain")).unwrap();

    let items = recycle.list_recycle(&ctx, "", "/").unwrap();
    let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["one", "two"]);

    let report = recycle.list_recycle_report(&ctx, "", "/").unwrap();
    assert_eq!(report.skipped, 1);
}

#[test]
fn test_unparsable_deletion_time_is_kept() {
    let (dir, recycle) = shared_storage();
    plant_trash_item(dir.path(), &recycle, "root", "odd", "yesterday", 3, "u");

    let items = recycle
        .list_recycle(&RequestContext::anonymous(), "", "/")
        .unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].deletion_time.is_none());
}

#[test]
fn test_listing_requires_default_permission() {
    let (_dir, recycle) = storage(false, ResourcePermissions::none());
    let err = recycle
        .list_recycle(&RequestContext::anonymous(), "", "/")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn test_unknown_key_lists_empty() {
    let (_dir, recycle) = shared_storage();
    let ctx = RequestContext::anonymous();
    assert!(recycle.list_recycle(&ctx, "nope", "/").unwrap().is_empty());
    assert!(recycle.list_recycle(&ctx, "nope", "a/b").unwrap().is_empty());
    // no trash directory at all yet
    assert!(recycle.list_recycle(&ctx, "", "/").unwrap().is_empty());
}

#[test]
fn test_subtree_listing() {
    let (_dir, recycle) = shared_storage();
    let ctx = RequestContext::anonymous();
    let tree = recycle.tree();
    let root = recycle.lookup().root_node().unwrap();
    let docs = tree.create_dir(&ctx, &root, "docs").unwrap();
    tree.create_file(&ctx, &docs, "a.txt", b"aaaa").unwrap();
    tree.create_file(&ctx, &docs, "b.txt", b"bb").unwrap();
    tree.create_dir(&ctx, &docs, "sub").unwrap();
    let key = tree.delete(&ctx, &docs).unwrap();

    let items = recycle.list_recycle(&ctx, &key, "/").unwrap();
    let summary: Vec<_> = items
        .iter()
        .map(|i| (i.key.clone(), i.origin_path.clone(), i.resource_type))
        .collect();
    assert_eq!(
        summary,
        vec![
            (format!("{key}/a.txt"), "/docs/a.txt".to_string(), ResourceType::File),
            (format!("{key}/b.txt"), "/docs/b.txt".to_string(), ResourceType::File),
            (format!("{key}/sub"), "/docs/sub".to_string(), ResourceType::Container),
        ]
    );
    assert!(items.iter().all(|i| i.deletion_time.is_some()));

    let single = recycle.list_recycle(&ctx, &key, "a.txt").unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].key, format!("{key}/a.txt"));
    assert_eq!(single[0].size, 4);
}

#[test]
fn test_home_trash_cycle() {
    let (_dir, recycle) = storage(true, ResourcePermissions::none());
    let alice = user("alice");
    let tree = recycle.tree();
    let home = tree.create_home(&alice).unwrap();
    let docs = tree.create_dir(&alice, &home, "docs").unwrap();
    let file = tree.create_file(&alice, &docs, "a.txt", b"abc").unwrap();

    let key = tree.delete(&alice, &file).unwrap();
    let items = recycle.list_recycle(&alice, "", "/").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].origin_path, "/docs/a.txt");
    assert!(recycle.list_recycle(&user("bob"), "", "/").unwrap().is_empty());

    recycle.restore_recycle_item(&alice, &key, "", None).unwrap();
    let restored = recycle
        .lookup()
        .node_from_path(&alice, "/docs/a.txt", false)
        .unwrap();
    assert_eq!(restored.id, file.id);
    assert!(recycle.list_recycle(&alice, "", "/").unwrap().is_empty());

    let key = tree.delete(&alice, &restored).unwrap();
    recycle.purge_recycle_item(&alice, &key, "").unwrap();
    assert!(recycle.list_recycle(&alice, "", "/").unwrap().is_empty());
    assert!(
        !recycle
            .lookup()
            .node_from_path(&alice, "/docs/a.txt", false)
            .unwrap()
            .exists
    );
}

#[test]
fn test_purge_denied_keeps_entry() {
    let (_dir, recycle) = shared_storage();
    let alice = user("alice");
    let tree = recycle.tree();
    let root = recycle.lookup().root_node().unwrap();
    let space = tree.create_space(&alice, &root, "project").unwrap();
    let file = tree.create_file(&alice, &space, "a.txt", b"abc").unwrap();
    let key = tree.delete(&alice, &file).unwrap();

    let err = recycle.purge_recycle_item(&user("bob"), &key, "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert!(err.to_string().contains(&key));
    assert_eq!(recycle.list_recycle(&alice, "", "/").unwrap().len(), 1);

    recycle.purge_recycle_item(&alice, &key, "").unwrap();
    assert!(recycle.list_recycle(&alice, "", "/").unwrap().is_empty());
}

#[test]
fn test_restore_needs_both_permissions() {
    let (_dir, base) = shared_storage();
    let ctx = RequestContext::anonymous();
    let tree = base.tree().clone();
    let root = base.lookup().root_node().unwrap();
    let docs = tree.create_dir(&ctx, &root, "docs").unwrap();
    let file = tree.create_file(&ctx, &docs, "a.txt", b"abc").unwrap();
    let key = tree.delete(&ctx, &file).unwrap();

    let restore = ResourcePermissions {
        restore_recycle_item: true,
        ..ResourcePermissions::none()
    };
    let upload = ResourcePermissions {
        initiate_file_upload: true,
        ..ResourcePermissions::none()
    };

    let only_trashed = Recycle::new(
        tree.clone(),
        Arc::new(GrantGate::default().grant(&file, restore)),
    );
    let err = only_trashed
        .restore_recycle_item(&ctx, &key, "", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let only_destination = Recycle::new(
        tree.clone(),
        Arc::new(GrantGate::default().grant(&docs, upload)),
    );
    let err = only_destination
        .restore_recycle_item(&ctx, &key, "", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(base.list_recycle(&ctx, "", "/").unwrap().len(), 1);

    let both = Recycle::new(
        tree.clone(),
        Arc::new(
            GrantGate::default()
                .grant(&file, restore)
                .grant(&docs, upload),
        ),
    );
    both.restore_recycle_item(&ctx, &key, "", None).unwrap();
    assert!(base.list_recycle(&ctx, "", "/").unwrap().is_empty());
    assert!(
        base.lookup()
            .node_from_path(&ctx, "/docs/a.txt", false)
            .unwrap()
            .exists
    );
}

#[test]
fn test_gate_failure_is_internal() {
    let (_dir, base) = shared_storage();
    let ctx = RequestContext::anonymous();
    let tree = base.tree().clone();
    let root = base.lookup().root_node().unwrap();
    let file = tree.create_file(&ctx, &root, "a.txt", b"abc").unwrap();
    let key = tree.delete(&ctx, &file).unwrap();

    let recycle = Recycle::new(
        tree,
        Arc::new(GrantGate {
            offline: true,
            ..GrantGate::default()
        }),
    );
    let err = recycle.purge_recycle_item(&ctx, &key, "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    let err = recycle
        .restore_recycle_item(&ctx, &key, "", None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(base.list_recycle(&ctx, "", "/").unwrap().len(), 1);
}

#[test]
fn test_restore_to_reference_target() {
    let (_dir, recycle) = storage(true, ResourcePermissions::none());
    let alice = user("alice");
    let tree = recycle.tree();
    let home = tree.create_home(&alice).unwrap();
    let file = tree.create_file(&alice, &home, "a.txt", b"abc").unwrap();
    let archive = tree.create_dir(&alice, &home, "archive").unwrap();
    let key = tree.delete(&alice, &file).unwrap();

    let target = Reference::relative(archive.resource_id(), "renamed.txt");
    recycle
        .restore_recycle_item(&alice, &key, "", Some(&target))
        .unwrap();

    let restored = recycle
        .lookup()
        .node_from_path(&alice, "/archive/renamed.txt", false)
        .unwrap();
    assert_eq!(restored.id, file.id);
}

#[test]
fn test_empty_recycle() {
    let (dir, recycle) = shared_storage();
    let ctx = RequestContext::anonymous();
    let tree = recycle.tree();
    let root = recycle.lookup().root_node().unwrap();
    let docs = tree.create_dir(&ctx, &root, "docs").unwrap();
    tree.create_file(&ctx, &docs, "a.txt", b"abc").unwrap();
    let keep = tree.create_file(&ctx, &root, "keep.txt", b"k").unwrap();
    tree.delete(&ctx, &docs).unwrap();

    recycle.empty_recycle(&ctx).unwrap();
    assert!(recycle.list_recycle(&ctx, "", "/").unwrap().is_empty());

    let mut left: Vec<_> = fs::read_dir(dir.path().join("nodes"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    let mut expected = vec!["root".to_string(), keep.id.to_string()];
    expected.sort();
    assert_eq!(left, expected);
}
