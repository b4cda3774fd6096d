//! Collaborators the engine consumes.
//!
//! Each is injected once into [`ContentRepositoryBuilder`](crate::ContentRepositoryBuilder).

use async_trait::async_trait;

use crate::model::{ContentType, Document, PermissionGrant, Template};
use crate::StorageError;

/// Content-type registry.
#[async_trait]
pub trait ContentTypeService: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<ContentType>, StorageError>;

    /// Content types for the given ids. Unknown ids are left out.
    async fn get_all(&self, ids: &[i64]) -> Result<Vec<ContentType>, StorageError>;

    async fn get_by_alias(&self, alias: &str) -> Result<Option<ContentType>, StorageError>;
}

/// Template registry.
#[async_trait]
pub trait TemplateService: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Template>, StorageError>;

    async fn get_all(&self, ids: &[i64]) -> Result<Vec<Template>, StorageError>;
}

/// Tag index for the tagged properties of published documents.
#[async_trait]
pub trait TagService: Send + Sync {
    /// (Re)index the tagged properties of this document version.
    async fn update_tags_for(&self, document: &Document) -> Result<(), StorageError>;

    /// Remove every tag association of the document's node.
    async fn clear_tags_for(&self, document: &Document) -> Result<(), StorageError>;
}

/// Per-node, per-user permission store.
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn get_grants_for(&self, node_id: i64) -> Result<Vec<PermissionGrant>, StorageError>;

    /// Replace every grant on `node_id` with `grants`.
    async fn replace_grants(
        &self,
        node_id: i64,
        grants: Vec<PermissionGrant>,
    ) -> Result<(), StorageError>;

    async fn assign_grant(
        &self,
        node_id: i64,
        permission: char,
        user_ids: &[i64],
    ) -> Result<(), StorageError>;
}

/// Read-optimized document cache. Advisory only, may be stale.
pub trait ReadCache: Send + Sync {
    fn get(&self, node_id: i64) -> Option<Document>;
}
