//! The content versioning and publish-state engine.
//!
//! [`ContentRepository`] is stateless apart from its injected collaborators.
//! Every operation takes the caller's unit of work (a
//! [`TransactionExecutor`](crate::TransactionExecutor)) and issues its
//! statements through it strictly in sequence; the caller owns begin, commit,
//! rollback and any per-node locking.

mod naming;
mod persist;
mod projector;
mod properties;
mod publish;
mod tree;
mod versions;

use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::model::PermissionGrant;
use crate::services::{
    ContentTypeService, PermissionService, ReadCache, TagService, TemplateService,
};
use crate::ContentError;

pub use naming::{compare_similar_names, resolve_unique_name};
pub use projector::{ContentQuery, PageRequest, order_by_column};
pub use properties::sanitize_text;

/// Persistence and versioning core for documents.
pub struct ContentRepository {
    config: EngineConfig,
    content_types: Arc<dyn ContentTypeService>,
    templates: Arc<dyn TemplateService>,
    tags: Arc<dyn TagService>,
    permissions: Arc<dyn PermissionService>,
    cache: Option<Arc<dyn ReadCache>>,
}

impl fmt::Debug for ContentRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentRepository")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl ContentRepository {
    pub fn builder() -> ContentRepositoryBuilder {
        ContentRepositoryBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Grant `permission` on `node_id` to each of `user_ids`.
    pub async fn assign_permission(
        &self,
        node_id: i64,
        permission: char,
        user_ids: &[i64],
    ) -> Result<(), ContentError> {
        self.permissions
            .assign_grant(node_id, permission, user_ids)
            .await?;
        Ok(())
    }

    pub async fn replace_permissions(
        &self,
        node_id: i64,
        grants: Vec<PermissionGrant>,
    ) -> Result<(), ContentError> {
        self.permissions.replace_grants(node_id, grants).await?;
        Ok(())
    }

    pub async fn get_permissions(
        &self,
        node_id: i64,
    ) -> Result<Vec<PermissionGrant>, ContentError> {
        Ok(self.permissions.get_grants_for(node_id).await?)
    }
}

/// Builder for [`ContentRepository`].
///
/// Content types, templates, tags and permissions are required; `build()`
/// fails with [`ContentError::InvalidArgument`] when one is missing. The read
/// cache is optional.
#[derive(Default)]
pub struct ContentRepositoryBuilder {
    config: EngineConfig,
    content_types: Option<Arc<dyn ContentTypeService>>,
    templates: Option<Arc<dyn TemplateService>>,
    tags: Option<Arc<dyn TagService>>,
    permissions: Option<Arc<dyn PermissionService>>,
    cache: Option<Arc<dyn ReadCache>>,
}

impl ContentRepositoryBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn content_types(mut self, service: Arc<dyn ContentTypeService>) -> Self {
        self.content_types = Some(service);
        self
    }

    pub fn templates(mut self, service: Arc<dyn TemplateService>) -> Self {
        self.templates = Some(service);
        self
    }

    pub fn tags(mut self, service: Arc<dyn TagService>) -> Self {
        self.tags = Some(service);
        self
    }

    pub fn permissions(mut self, service: Arc<dyn PermissionService>) -> Self {
        self.permissions = Some(service);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ReadCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<ContentRepository, ContentError> {
        let missing = |name: &str| ContentError::InvalidArgument(format!("{name} is required"));

        Ok(ContentRepository {
            config: self.config,
            content_types: self.content_types.ok_or_else(|| missing("content type service"))?,
            templates: self.templates.ok_or_else(|| missing("template service"))?,
            tags: self.tags.ok_or_else(|| missing("tag service"))?,
            permissions: self.permissions.ok_or_else(|| missing("permission service"))?,
            cache: self.cache,
        })
    }
}
