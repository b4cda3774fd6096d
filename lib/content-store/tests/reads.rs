#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use content_store::{ContentError, ContentQuery, Order, PageRequest, PublishIntent, QueryExecutor};

#[tokio::test]
async fn paging_returns_one_page_and_the_total() {
    let h = harness().await;
    let folder = h.create("Folder", -1, page_type(), PublishIntent::Save).await;
    for i in 0..25 {
        h.create(&format!("Item {i:02}"), folder.id, page_type(), PublishIntent::Save)
            .await;
    }

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let query = ContentQuery::new().parent_id(folder.id);
    let page = h
        .repo
        .get_paged(&mut tx, &query, &PageRequest::new(1, 10))
        .await
        .unwrap();

    assert_eq!(page.total_records, 25);
    assert_eq!(page.items.len(), 10);
    let sort_orders: Vec<i32> = page.items.iter().map(|d| d.sort_order).collect();
    assert_eq!(sort_orders, (10..20).collect::<Vec<_>>());

    let last = h
        .repo
        .get_paged(&mut tx, &query, &PageRequest::new(2, 10))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 5);
    assert_eq!(last.total_records, 25);
}

#[tokio::test]
async fn paging_orders_by_mapped_fields() {
    let h = harness().await;
    for name in ["Banana", "Apple", "Cherry"] {
        h.create(name, -1, page_type(), PublishIntent::Save).await;
    }

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let request = PageRequest::new(0, 10).order_by("Name", Order::Desc);
    let page = h
        .repo
        .get_paged(&mut tx, &ContentQuery::new(), &request)
        .await
        .unwrap();

    let names: Vec<&str> = page.items.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Cherry", "Banana", "Apple"]);
}

#[tokio::test]
async fn paging_by_content_type_alias_is_not_supported() {
    let h = harness().await;
    h.create("Home", -1, page_type(), PublishIntent::Save).await;

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let request = PageRequest::new(0, 10).order_by("CONTENTTYPEALIAS", Order::Asc);
    let err = h
        .repo
        .get_paged(&mut tx, &ContentQuery::new(), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, ContentError::NotSupported(_)));
}

#[tokio::test]
async fn paging_applies_the_extra_filter_and_version_switch() {
    let h = harness().await;
    let mut home = h.create("Home", -1, page_type(), PublishIntent::Save).await;
    h.create("Story", -1, article_type(), PublishIntent::Save).await;
    h.save(&mut home, PublishIntent::Publish).await;

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let pages_only = PageRequest::new(0, 10).filter(ContentQuery::new().content_type(PAGE_TYPE));
    let page = h
        .repo
        .get_paged(&mut tx, &ContentQuery::new(), &pages_only)
        .await
        .unwrap();
    assert_eq!(page.total_records, 1);
    assert_eq!(page.items[0].name, "Home");

    let history = h
        .repo
        .get_paged(
            &mut tx,
            &ContentQuery::new().ids(&[home.id]),
            &PageRequest::new(0, 10).all_versions(),
        )
        .await
        .unwrap();
    assert_eq!(history.total_records, 2);
    assert_eq!(history.items.len(), 2);
}

#[tokio::test]
async fn queries_return_tree_order() {
    let h = harness().await;
    let b = h.create("B", -1, page_type(), PublishIntent::Save).await;
    let a = h.create("A", -1, page_type(), PublishIntent::Save).await;
    let child = h.create("Child", b.id, page_type(), PublishIntent::Save).await;

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let all = h.repo.get_by_query(&mut tx, &ContentQuery::new()).await.unwrap();
    let ids: Vec<i64> = all.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![b.id, a.id, child.id]);

    let descendants = h
        .repo
        .get_by_query(&mut tx, &ContentQuery::new().path_starts_with(format!("{},", b.path)))
        .await
        .unwrap();
    assert_eq!(descendants.len(), 1);
    assert_eq!(descendants[0].id, child.id);

    let subset = h.repo.get_all(&mut tx, &[child.id, a.id]).await.unwrap();
    assert_eq!(subset.iter().map(|d| d.id).collect::<Vec<_>>(), vec![a.id, child.id]);
    assert_eq!(h.repo.get_all(&mut tx, &[]).await.unwrap().len(), 3);
}

#[tokio::test]
async fn get_by_version_reads_history() {
    let h = harness().await;
    let mut document = h.create("Home", -1, page_type(), PublishIntent::Publish).await;
    let first = document.version_id;
    document.set_value("title", "Changed");
    h.save(&mut document, PublishIntent::Save).await;

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let old = h.repo.get_by_version(&mut tx, first).await.unwrap().unwrap();
    assert_eq!(old.value("title"), Some(&serde_json::json!("Home")));
    assert!(old.published);

    let current = h.repo.get(&mut tx, document.id).await.unwrap().unwrap();
    assert_eq!(current.version_id, document.version_id);
    assert_eq!(current.value("title"), Some(&serde_json::json!("Changed")));
    assert!(!current.published);
    assert_eq!(current.published_version, Some(first));
}

#[tokio::test]
async fn published_query_returns_live_versions() {
    let h = harness().await;
    let mut live = h.create("Live", -1, page_type(), PublishIntent::Publish).await;
    h.create("Draft", -1, page_type(), PublishIntent::Save).await;
    live.set_value("title", "Unpublished edit");
    h.save(&mut live, PublishIntent::Save).await;

    let mut tx = h.pool.begin_transaction().await.unwrap();
    let published = h
        .repo
        .get_by_published_query(&mut tx, &ContentQuery::new())
        .await
        .unwrap();

    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, live.id);
    assert_eq!(published[0].value("title"), Some(&serde_json::json!("Live")));
}

#[tokio::test]
async fn cached_documents_are_used_only_when_published() {
    let h = harness().await;
    let live = h.create("Live", -1, page_type(), PublishIntent::Publish).await;
    let query = ContentQuery::new().ids(&[live.id]);
    let mut tx = h.pool.begin_transaction().await.unwrap();

    let mut stale = live.clone();
    stale.name = "From cache".into();
    stale.published = false;
    h.cache.put(stale);
    let result = h.repo.get_by_published_query(&mut tx, &query).await.unwrap();
    assert_eq!(result[0].name, "Live");

    let mut cached = live.clone();
    cached.name = "From cache".into();
    h.cache.put(cached);
    let result = h.repo.get_by_published_query(&mut tx, &query).await.unwrap();
    assert_eq!(result[0].name, "From cache");
}

#[tokio::test]
async fn rows_with_unknown_content_types_are_skipped() {
    let h = harness().await;
    let page = h.create("Page", -1, page_type(), PublishIntent::Save).await;
    let story = h.create("Story", -1, article_type(), PublishIntent::Save).await;

    let narrow = h.repo_with_types(vec![page_type()]);
    let mut tx = h.pool.begin_transaction().await.unwrap();

    let all = narrow.get_all(&mut tx, &[]).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, page.id);
    assert!(narrow.get(&mut tx, story.id).await.unwrap().is_none());
}

#[tokio::test]
async fn counts_follow_publication_and_type() {
    let h = harness().await;
    h.create("Home", -1, page_type(), PublishIntent::Publish).await;
    h.create("About", -1, page_type(), PublishIntent::Publish).await;
    h.create("Story", -1, article_type(), PublishIntent::Publish).await;
    h.create("Draft", -1, page_type(), PublishIntent::Save).await;

    let mut tx = h.pool.begin_transaction().await.unwrap();
    assert_eq!(h.repo.count_published(&mut tx, None).await.unwrap(), 3);
    assert_eq!(h.repo.count_published(&mut tx, Some("page")).await.unwrap(), 2);
    assert_eq!(h.repo.count_published(&mut tx, Some("unknown")).await.unwrap(), 0);
    assert_eq!(h.repo.count(&mut tx, &ContentQuery::new()).await.unwrap(), 4);
    assert_eq!(
        h.repo
            .count(&mut tx, &ContentQuery::new().content_type(ARTICLE_TYPE))
            .await
            .unwrap(),
        1
    );
}
