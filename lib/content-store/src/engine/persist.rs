//! Create, update and delete of documents.

use uuid::Uuid;

use crate::model::{Document, PermissionGrant, PublishIntent, PublishedState};
use crate::rows::{
    AccessRow, AccessRuleRow, ContentRow, ContentVersionRow, DocumentRow, DomainRow,
    NodePermissionRow, NodeRow, PropertyDataRow, RedirectUrlRow, RelationRow, TagRelationshipRow,
};
use crate::{ContentError, ContentRepository, Delete, Query, StorageDatetime, TransactionExecutor};

use super::properties::sanitize_document;
use super::publish::{clears_published, derive_state, new_document_state, written_published_flag};
use super::tree::child_path;
use super::versions::{detect_changes, requires_new_version};

impl ContentRepository {
    /// Store a document that has no identity yet.
    ///
    /// Assigns the node id, path, level and sort order, writes the first
    /// version and copies the parent's permission grants onto the new node.
    pub async fn persist_new<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &mut Document,
        intent: PublishIntent,
    ) -> Result<PublishedState, ContentError> {
        if document.has_identity() {
            return Err(ContentError::InvalidArgument(format!(
                "document {} is already stored",
                document.id
            )));
        }
        let state = new_document_state(intent)?;

        if document.template.is_none() {
            document.template = document.content_type.default_template.clone();
        }
        sanitize_document(document);
        document.name = self
            .ensure_unique_name(tx, document.parent_id, &document.name, 0)
            .await?;

        let parent = self.parent_node(tx, document.parent_id).await?;
        let sort_order = self.next_child_sort_order(tx, document.parent_id).await?;

        let now = StorageDatetime::now();
        document.create_date = now.clone();
        document.update_date = now.clone();
        document.version_date = now.clone();
        document.version_id = Uuid::new_v4();

        let mut node = NodeRow {
            id: 0,
            unique_id: document.key,
            parent_id: document.parent_id,
            level: parent.level + 1,
            path: parent.path.clone(),
            sort_order,
            trashed: document.trashed,
            user_id: document.creator_id,
            text: document.name.clone(),
            node_object_type: self.config.object_type,
            create_date: now,
        };
        self.allocate_node(tx, &mut node).await?;
        self.finalize_path(tx, &mut node, &parent.path).await?;

        document.id = node.id;
        document.path = node.path.clone();
        document.level = node.level;
        document.sort_order = node.sort_order;

        self.inherit_permissions(document).await?;

        tx.insert_returning_id(&ContentRow {
            pk: 0,
            node_id: document.id,
            content_type_id: document.content_type_id(),
        })
        .await?;

        document.published = written_published_flag(state, false, false);
        self.write_version(tx, document, true, None).await?;
        self.persist_properties(tx, document, true).await?;

        document.published_version = document.published.then_some(document.version_id);
        if document.published {
            self.sync_tags(tx, document, state, false).await?;
        }
        document.published_state = state;

        tracing::info!(
            node_id = document.id,
            path = %document.path,
            version_id = %document.version_id,
            ?state,
            "created document"
        );
        Ok(state)
    }

    /// Store changes to an existing document.
    ///
    /// Returns without writing anything when nothing changed and the intent
    /// is not a publish transition.
    pub async fn persist_updated<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &mut Document,
        intent: PublishIntent,
    ) -> Result<PublishedState, ContentError> {
        if !document.has_identity() {
            return Err(ContentError::InvalidArgument(
                "document has no identity; use persist_new".to_string(),
            ));
        }

        let snapshot = self.load_snapshot(tx, document).await?;
        let changes = detect_changes(document, &snapshot);
        let state = derive_state(
            intent,
            snapshot.newest.published,
            snapshot.published_version.is_some(),
            changes.content,
        );

        if !state.is_transition() && !changes.any() {
            document.published_state = state;
            document.published_version = snapshot.published_version;
            tracing::debug!(node_id = document.id, ?state, "nothing to persist");
            return Ok(state);
        }

        let new_version = requires_new_version(state, snapshot.newest.published, &changes);
        let content_type_reset = changes.content_type && state != PublishedState::Publishing;

        let now = StorageDatetime::now();
        document.version_id = if new_version {
            Uuid::new_v4()
        } else {
            snapshot.current.version_id
        };
        document.version_date = now.clone();
        document.update_date = now;

        sanitize_document(document);
        if changes.content || changes.moved {
            document.name = self
                .ensure_unique_name(tx, document.parent_id, &document.name, document.id)
                .await?;
        }

        if changes.moved {
            let parent = self.parent_node(tx, document.parent_id).await?;
            document.path = child_path(&parent.path, document.id);
            document.level = parent.level + 1;
            document.sort_order = self.next_child_sort_order(tx, document.parent_id).await?;
        }

        let node = NodeRow {
            id: document.id,
            unique_id: snapshot.node.unique_id,
            parent_id: document.parent_id,
            level: document.level,
            path: document.path.clone(),
            sort_order: document.sort_order,
            trashed: document.trashed,
            user_id: snapshot.node.user_id,
            text: document.name.clone(),
            node_object_type: snapshot.node.node_object_type,
            create_date: snapshot.node.create_date.clone(),
        };
        tx.update(&node).await?;

        if changes.content_type {
            tx.update(&ContentRow {
                pk: snapshot.content.pk,
                node_id: document.id,
                content_type_id: document.content_type_id(),
            })
            .await?;
        }

        if clears_published(state, changes.content_type) {
            self.clear_published_flag(tx, document.id).await?;
        }
        self.clear_newest_flag(tx, document.id).await?;

        let target_published = !new_version && snapshot.current.published;
        document.published = written_published_flag(state, content_type_reset, target_published);
        self.write_version(tx, document, new_version, Some(&snapshot))
            .await?;
        self.persist_properties(tx, document, new_version).await?;

        document.published_version = if document.published {
            Some(document.version_id)
        } else if state.is_transition() || content_type_reset {
            None
        } else {
            snapshot.published_version
        };

        self.sync_tags(tx, document, state, content_type_reset)
            .await?;
        document.published_state = state;

        tracing::info!(
            node_id = document.id,
            version_id = %document.version_id,
            ?state,
            new_version,
            moved = changes.moved,
            "updated document"
        );
        Ok(state)
    }

    /// Remove a document and every row that references its node.
    pub async fn persist_deleted<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &Document,
    ) -> Result<(), ContentError> {
        let id = document.id;

        let key = tx
            .fetch_optional(Query::<NodeRow>::new().eq("id", id))
            .await?
            .map(|node| node.unique_id)
            .unwrap_or(document.key);

        let access: Vec<Uuid> = tx
            .fetch(Query::<AccessRow>::new().eq("node_id", id))
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();
        if !access.is_empty() {
            tx.delete(Delete::<AccessRuleRow>::new().r#in("access_id", access))
                .await?;
        }

        tx.delete(Delete::<RedirectUrlRow>::new().eq("content_key", key))
            .await?;
        tx.delete(Delete::<NodePermissionRow>::new().eq("node_id", id))
            .await?;
        tx.delete(Delete::<RelationRow>::new().eq("parent_id", id))
            .await?;
        tx.delete(Delete::<RelationRow>::new().eq("child_id", id))
            .await?;
        tx.delete(Delete::<TagRelationshipRow>::new().eq("node_id", id))
            .await?;
        tx.delete(Delete::<DomainRow>::new().eq("root_node_id", id))
            .await?;
        tx.delete(Delete::<DocumentRow>::new().eq("node_id", id))
            .await?;
        tx.delete(Delete::<PropertyDataRow>::new().eq("node_id", id))
            .await?;
        tx.delete(Delete::<ContentVersionRow>::new().eq("node_id", id))
            .await?;
        tx.delete(Delete::<ContentRow>::new().eq("node_id", id))
            .await?;
        tx.delete(Delete::<AccessRow>::new().eq("node_id", id))
            .await?;
        let removed = tx.delete(Delete::<NodeRow>::new().eq("id", id)).await?;

        tracing::info!(node_id = id, removed, "deleted document");
        Ok(())
    }

    async fn inherit_permissions(&self, document: &mut Document) -> Result<(), ContentError> {
        let grants: Vec<PermissionGrant> = self
            .permissions
            .get_grants_for(document.parent_id)
            .await?
            .into_iter()
            .map(|grant| PermissionGrant {
                node_id: document.id,
                ..grant
            })
            .collect();

        if grants.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            node_id = document.id,
            parent_id = document.parent_id,
            count = grants.len(),
            "inheriting parent permissions"
        );
        self.permissions.replace_grants(document.id, grants).await?;
        document.permissions_changed = true;
        Ok(())
    }
}
