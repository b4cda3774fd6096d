#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use common::*;
use content_store::{
    ContentError, Document, EngineConfig, PermissionGrant, PublishIntent, QueryExecutor,
    TransactionExecutor,
};

#[tokio::test]
async fn create_assigns_path_and_level() {
    let h = harness().await;
    let parent = h.create("Home", -1, page_type(), PublishIntent::Save).await;
    let child = h.create("About", parent.id, page_type(), PublishIntent::Save).await;

    assert!(parent.has_identity());
    assert_eq!(parent.path, format!("-1,{}", parent.id));
    assert_eq!(parent.level, 1);
    assert_eq!(child.path, format!("-1,{},{}", parent.id, child.id));
    assert_eq!(child.level, 2);

    let stored = h.get(child.id).await.unwrap();
    assert_eq!(stored.path, child.path);
    assert_eq!(stored.level, 2);
    assert_eq!(stored.parent_id, parent.id);
}

#[tokio::test]
async fn sort_order_trails_existing_siblings() {
    let h = harness().await;
    let first = h.create("One", -1, page_type(), PublishIntent::Save).await;
    let second = h.create("Two", -1, page_type(), PublishIntent::Save).await;
    let third = h.create("Three", -1, page_type(), PublishIntent::Save).await;

    assert_eq!(first.sort_order, 0);
    assert_eq!(second.sort_order, 1);
    assert_eq!(third.sort_order, 2);
}

#[tokio::test]
async fn colliding_names_get_numbered() {
    let h = harness().await;
    let a = h.create("Home", -1, page_type(), PublishIntent::Save).await;
    let b = h.create("Home", -1, page_type(), PublishIntent::Save).await;
    let c = h.create("Home", -1, page_type(), PublishIntent::Save).await;

    assert_eq!(a.name, "Home");
    assert_eq!(b.name, "Home (1)");
    assert_eq!(c.name, "Home (2)");
}

#[tokio::test]
async fn names_in_other_folders_do_not_collide() {
    let h = harness().await;
    let left = h.create("Left", -1, page_type(), PublishIntent::Save).await;
    let right = h.create("Right", -1, page_type(), PublishIntent::Save).await;
    let a = h.create("News", left.id, page_type(), PublishIntent::Save).await;
    let b = h.create("News", right.id, page_type(), PublishIntent::Save).await;

    assert_eq!(a.name, "News");
    assert_eq!(b.name, "News");
}

#[tokio::test]
async fn unique_naming_can_be_disabled() {
    let config = EngineConfig::from_toml_str("ensure_unique_naming = false").unwrap();
    let h = harness_with(config).await;
    h.create("Home", -1, page_type(), PublishIntent::Save).await;
    let twin = h.create("Home", -1, page_type(), PublishIntent::Save).await;

    assert_eq!(twin.name, "Home");
}

#[tokio::test]
async fn renaming_onto_a_sibling_is_suffixed() {
    let h = harness().await;
    h.create("Home", -1, page_type(), PublishIntent::Save).await;
    let mut other = h.create("Other", -1, page_type(), PublishIntent::Save).await;

    other.name = "Home".into();
    h.save(&mut other, PublishIntent::Save).await;

    assert_eq!(other.name, "Home (1)");
    assert_eq!(h.get(other.id).await.unwrap().name, "Home (1)");
}

#[tokio::test]
async fn move_recomputes_path_level_and_sort_order() {
    let h = harness().await;
    let a = h.create("A", -1, page_type(), PublishIntent::Save).await;
    let b = h.create("B", -1, page_type(), PublishIntent::Save).await;
    h.create("Existing", b.id, page_type(), PublishIntent::Save).await;
    let mut child = h.create("Child", a.id, page_type(), PublishIntent::Save).await;

    child.parent_id = b.id;
    h.save(&mut child, PublishIntent::Save).await;

    assert_eq!(child.path, format!("-1,{},{}", b.id, child.id));
    assert_eq!(child.level, 2);
    assert_eq!(child.sort_order, 1);

    let stored = h.get(child.id).await.unwrap();
    assert_eq!(stored.parent_id, b.id);
    assert_eq!(stored.path, child.path);
}

#[tokio::test]
async fn moves_keep_grants_and_descendant_paths() {
    let h = harness().await;
    let a = h.create("A", -1, page_type(), PublishIntent::Save).await;
    h.repo.assign_permission(a.id, 'R', &[3]).await.unwrap();
    let b = h.create("B", -1, page_type(), PublishIntent::Save).await;
    let mut child = h.create("Child", a.id, page_type(), PublishIntent::Save).await;
    let grandchild = h.create("Grandchild", child.id, page_type(), PublishIntent::Save).await;
    h.repo.assign_permission(b.id, 'F', &[9]).await.unwrap();
    let before = h.repo.get_permissions(child.id).await.unwrap();
    assert_eq!(before.len(), 1);

    child.parent_id = b.id;
    h.save(&mut child, PublishIntent::Save).await;

    assert_eq!(h.repo.get_permissions(child.id).await.unwrap(), before);
    assert!(!h.repo.get_permissions(child.id).await.unwrap().iter().any(|g| g.user_id == 9));

    // Descendants keep the path they had under the old parent
    let stored = h.get(grandchild.id).await.unwrap();
    assert_eq!(stored.path, grandchild.path);
    assert_eq!(stored.path, format!("-1,{},{},{}", a.id, child.id, grandchild.id));
    assert_eq!(stored.level, 3);
}

#[tokio::test]
async fn missing_parent_is_not_found() {
    let h = harness().await;
    let mut document = Document::new("Orphan", 4242, Arc::new(page_type()));
    let mut tx = h.pool.begin_transaction().await.unwrap();
    let err = h
        .repo
        .persist_new(&mut tx, &mut document, PublishIntent::Save)
        .await
        .unwrap_err();

    assert!(matches!(err, ContentError::NotFound(_)));
}

#[tokio::test]
async fn parent_permissions_are_copied_to_new_children() {
    let h = harness().await;
    let parent = h.create("Secure", -1, page_type(), PublishIntent::Save).await;
    h.repo.assign_permission(parent.id, 'F', &[5, 6]).await.unwrap();

    let child = h.create("Inner", parent.id, page_type(), PublishIntent::Save).await;
    let plain = h.create("Plain", -1, page_type(), PublishIntent::Save).await;

    assert!(child.permissions_changed);
    assert!(!plain.permissions_changed);
    let mut grants = h.repo.get_permissions(child.id).await.unwrap();
    grants.sort_by_key(|g| g.user_id);
    assert_eq!(
        grants,
        vec![
            PermissionGrant { node_id: child.id, user_id: 5, permission: 'F' },
            PermissionGrant { node_id: child.id, user_id: 6, permission: 'F' },
        ]
    );
}

#[tokio::test]
async fn replace_permissions_swaps_the_set() {
    let h = harness().await;
    let node = h.create("Node", -1, page_type(), PublishIntent::Save).await;
    h.repo.assign_permission(node.id, 'A', &[1]).await.unwrap();
    h.repo
        .replace_permissions(
            node.id,
            vec![PermissionGrant { node_id: node.id, user_id: 2, permission: 'B' }],
        )
        .await
        .unwrap();

    let grants = h.repo.get_permissions(node.id).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].user_id, 2);
}

#[tokio::test]
async fn default_template_is_assigned_and_read_back() {
    let h = harness().await;
    let landing = h.create("Landing", -1, landing_type(), PublishIntent::Save).await;

    assert_eq!(landing.template.as_ref().map(|t| t.id), Some(DEFAULT_TEMPLATE));
    let stored = h.get(landing.id).await.unwrap();
    assert_eq!(stored.template.map(|t| t.alias), Some("landing".to_string()));
}

#[tokio::test]
async fn invalid_xml_characters_are_stripped() {
    let h = harness().await;
    let mut document = Document::new("Bad\u{0001}Name", -1, Arc::new(page_type()));
    document.set_value("body", "line\u{0002}one\nline two");

    let mut tx = h.pool.begin_transaction().await.unwrap();
    h.repo
        .persist_new(&mut tx, &mut document, PublishIntent::Save)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let stored = h.get(document.id).await.unwrap();
    assert_eq!(stored.name, "BadName");
    assert_eq!(stored.value("body"), Some(&serde_json::json!("lineone\nline two")));
}

#[tokio::test]
async fn exists_checks_node_and_object_type() {
    let h = harness().await;
    let node = h.create("Node", -1, page_type(), PublishIntent::Save).await;
    let mut tx = h.pool.begin_transaction().await.unwrap();

    assert!(h.repo.exists(&mut tx, node.id).await.unwrap());
    assert!(!h.repo.exists(&mut tx, 9999).await.unwrap());
    // The root carries a different object type
    assert!(!h.repo.exists(&mut tx, -1).await.unwrap());
}
