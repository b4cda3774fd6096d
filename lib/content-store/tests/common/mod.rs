//! Shared fixtures: in-memory collaborators and a seeded store.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use content_store::rows::{DocumentRow, NodeRow};
use content_store::{
    ContentRepository, ContentType, ContentTypeService, Document, EngineConfig, PermissionGrant,
    PermissionService, PropertyType, PublishIntent, PublishedState, Query, QueryExecutor,
    ReadCache, StorageDatetime, StorageError, TagService, Template, TemplateService,
    TransactionExecutor,
};
use content_store_memory::MemoryPool;
use uuid::Uuid;

pub const PAGE_TYPE: i64 = 10;
pub const ARTICLE_TYPE: i64 = 11;
pub const LANDING_TYPE: i64 = 12;
pub const DEFAULT_TEMPLATE: i64 = 3;

pub fn page_type() -> ContentType {
    ContentType {
        id: PAGE_TYPE,
        alias: "page".into(),
        property_types: vec![PropertyType::new(1, "title"), PropertyType::new(2, "body")],
        default_template: None,
    }
}

pub fn article_type() -> ContentType {
    ContentType {
        id: ARTICLE_TYPE,
        alias: "article".into(),
        property_types: vec![PropertyType::new(1, "title"), PropertyType::tag(3, "tags")],
        default_template: None,
    }
}

pub fn landing_type() -> ContentType {
    ContentType {
        id: LANDING_TYPE,
        alias: "landing".into(),
        property_types: vec![PropertyType::new(1, "title")],
        default_template: Some(Template {
            id: DEFAULT_TEMPLATE,
            alias: "landing".into(),
        }),
    }
}

#[derive(Default)]
pub struct StaticContentTypes {
    types: HashMap<i64, ContentType>,
}

impl StaticContentTypes {
    pub fn new(types: Vec<ContentType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.id, t)).collect(),
        }
    }
}

#[async_trait]
impl ContentTypeService for StaticContentTypes {
    async fn get(&self, id: i64) -> Result<Option<ContentType>, StorageError> {
        Ok(self.types.get(&id).cloned())
    }

    async fn get_all(&self, ids: &[i64]) -> Result<Vec<ContentType>, StorageError> {
        Ok(ids.iter().filter_map(|id| self.types.get(id).cloned()).collect())
    }

    async fn get_by_alias(&self, alias: &str) -> Result<Option<ContentType>, StorageError> {
        Ok(self.types.values().find(|t| t.alias == alias).cloned())
    }
}

pub struct StaticTemplates;

#[async_trait]
impl TemplateService for StaticTemplates {
    async fn get(&self, id: i64) -> Result<Option<Template>, StorageError> {
        Ok((id == DEFAULT_TEMPLATE).then(|| Template {
            id,
            alias: "landing".into(),
        }))
    }

    async fn get_all(&self, ids: &[i64]) -> Result<Vec<Template>, StorageError> {
        let mut found = Vec::new();
        for id in ids {
            found.extend(self.get(*id).await?);
        }
        Ok(found)
    }
}

/// Tag index keyed by node id.
#[derive(Default)]
pub struct RecordingTags {
    index: Mutex<HashMap<i64, Vec<String>>>,
}

impl RecordingTags {
    pub fn tags_for(&self, node_id: i64) -> Vec<String> {
        self.index
            .lock()
            .unwrap()
            .get(&node_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TagService for RecordingTags {
    async fn update_tags_for(&self, document: &Document) -> Result<(), StorageError> {
        let tags: Vec<String> = document
            .tagged_properties()
            .filter_map(|p| p.value.as_array())
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        self.index.lock().unwrap().insert(document.id, tags);
        Ok(())
    }

    async fn clear_tags_for(&self, document: &Document) -> Result<(), StorageError> {
        self.index.lock().unwrap().remove(&document.id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPermissions {
    grants: Mutex<Vec<PermissionGrant>>,
}

#[async_trait]
impl PermissionService for MemoryPermissions {
    async fn get_grants_for(&self, node_id: i64) -> Result<Vec<PermissionGrant>, StorageError> {
        Ok(self
            .grants
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn replace_grants(
        &self,
        node_id: i64,
        grants: Vec<PermissionGrant>,
    ) -> Result<(), StorageError> {
        let mut stored = self.grants.lock().unwrap();
        stored.retain(|g| g.node_id != node_id);
        stored.extend(grants);
        Ok(())
    }

    async fn assign_grant(
        &self,
        node_id: i64,
        permission: char,
        user_ids: &[i64],
    ) -> Result<(), StorageError> {
        let mut stored = self.grants.lock().unwrap();
        for user_id in user_ids {
            let grant = PermissionGrant {
                node_id,
                user_id: *user_id,
                permission,
            };
            if !stored.contains(&grant) {
                stored.push(grant);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    documents: Mutex<HashMap<i64, Document>>,
}

impl MemoryCache {
    pub fn put(&self, document: Document) {
        self.documents.lock().unwrap().insert(document.id, document);
    }
}

impl ReadCache for MemoryCache {
    fn get(&self, node_id: i64) -> Option<Document> {
        self.documents.lock().unwrap().get(&node_id).cloned()
    }
}

pub struct Harness {
    pub pool: MemoryPool,
    pub repo: ContentRepository,
    pub tags: Arc<RecordingTags>,
    pub permissions: Arc<MemoryPermissions>,
    pub cache: Arc<MemoryCache>,
}

fn system_node(id: i64, path: &str, level: i32, text: &str) -> NodeRow {
    NodeRow {
        id,
        unique_id: Uuid::new_v4(),
        parent_id: -1,
        level,
        path: path.to_string(),
        sort_order: 0,
        trashed: false,
        user_id: 0,
        text: text.to_string(),
        node_object_type: Uuid::new_v4(),
        create_date: StorageDatetime::now(),
    }
}

/// Store seeded with the root and recycle bin, plus a repository over it.
pub async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

pub async fn harness_with(config: EngineConfig) -> Harness {
    let pool = MemoryPool::new();
    let mut tx = pool.begin_transaction().await.unwrap();
    tx.insert(&system_node(-1, "-1", 0, "Root")).await.unwrap();
    tx.insert(&system_node(-20, "-1,-20", 1, "Recycle Bin"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let tags = Arc::new(RecordingTags::default());
    let permissions = Arc::new(MemoryPermissions::default());
    let cache = Arc::new(MemoryCache::default());
    let repo = ContentRepository::builder()
        .config(config)
        .content_types(Arc::new(StaticContentTypes::new(vec![
            page_type(),
            article_type(),
            landing_type(),
        ])))
        .templates(Arc::new(StaticTemplates))
        .tags(tags.clone())
        .permissions(permissions.clone())
        .cache(cache.clone())
        .build()
        .unwrap();

    Harness {
        pool,
        repo,
        tags,
        permissions,
        cache,
    }
}

impl Harness {
    /// Repository over the same store, resolving only `types`.
    pub fn repo_with_types(&self, types: Vec<ContentType>) -> ContentRepository {
        ContentRepository::builder()
            .content_types(Arc::new(StaticContentTypes::new(types)))
            .templates(Arc::new(StaticTemplates))
            .tags(self.tags.clone())
            .permissions(self.permissions.clone())
            .build()
            .unwrap()
    }

    pub async fn create(
        &self,
        name: &str,
        parent_id: i64,
        content_type: ContentType,
        intent: PublishIntent,
    ) -> Document {
        let mut document = Document::new(name, parent_id, Arc::new(content_type));
        document.set_value("title", name);
        let mut tx = self.pool.begin_transaction().await.unwrap();
        self.repo
            .persist_new(&mut tx, &mut document, intent)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        document
    }

    pub async fn save(&self, document: &mut Document, intent: PublishIntent) -> PublishedState {
        let mut tx = self.pool.begin_transaction().await.unwrap();
        let state = self
            .repo
            .persist_updated(&mut tx, document, intent)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        state
    }

    pub async fn get(&self, id: i64) -> Option<Document> {
        let mut tx = self.pool.begin_transaction().await.unwrap();
        self.repo.get(&mut tx, id).await.unwrap()
    }

    pub async fn document_rows(&self, node_id: i64) -> Vec<DocumentRow> {
        self.pool
            .fetch(Query::<DocumentRow>::new().eq("node_id", node_id))
            .await
            .unwrap()
    }

    /// Exactly one newest row and at most one published row.
    pub async fn assert_version_flags(&self, node_id: i64) {
        let rows = self.document_rows(node_id).await;
        assert_eq!(rows.iter().filter(|r| r.newest).count(), 1, "newest rows of {node_id}");
        assert!(rows.iter().filter(|r| r.published).count() <= 1, "published rows of {node_id}");
    }
}
