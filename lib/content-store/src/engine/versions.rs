//! Version rows: snapshot of the stored state, change detection and writes.

use uuid::Uuid;

use crate::model::{Document, PublishedState};
use crate::rows::{ContentRow, ContentVersionRow, DocumentRow, NodeRow, PropertyDataRow};
use crate::{ContentError, ContentRepository, Delete, Query, StorageDatetime, TransactionExecutor};

/// Stored rows of a node as seen before an update.
#[derive(Debug, Clone)]
pub(crate) struct StoredSnapshot {
    pub node: NodeRow,
    pub content: ContentRow,
    /// The newest document row.
    pub newest: DocumentRow,
    /// Document row of the version the entity targets, the newest when the
    /// entity's version is unknown.
    pub current: DocumentRow,
    pub version: ContentVersionRow,
    /// Version id of the published row, if any.
    pub published_version: Option<Uuid>,
    pub properties: Vec<PropertyDataRow>,
}

/// What differs between an entity and its stored snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Changes {
    /// Name, template, content type or property values.
    pub content: bool,
    /// Parent, sort order or trashed flag.
    pub structure: bool,
    pub content_type: bool,
    pub moved: bool,
    /// The entity targets an older version than the newest row.
    pub stale: bool,
}

impl Changes {
    pub fn any(&self) -> bool {
        self.content || self.structure || self.content_type
    }
}

pub(crate) fn detect_changes(document: &Document, snapshot: &StoredSnapshot) -> Changes {
    let content_type = snapshot.content.content_type_id != document.content_type_id();
    let moved = snapshot.node.parent_id != document.parent_id;
    let stale = snapshot.current.version_id != snapshot.newest.version_id;

    let template_id = document.template.as_ref().map(|t| t.id);
    let properties_changed = document.properties.iter().any(|property| {
        let stored = snapshot
            .properties
            .iter()
            .find(|row| row.property_type_id == property.property_type_id)
            .map(|row| &row.value)
            .unwrap_or(&serde_json::Value::Null);
        *stored != property.value
    });

    Changes {
        // Saving an older version over the newest restores its content
        content: content_type
            || stale
            || snapshot.current.text != document.name
            || snapshot.current.template_id != template_id
            || properties_changed,
        structure: moved
            || snapshot.node.sort_order != document.sort_order
            || snapshot.node.trashed != document.trashed,
        content_type,
        moved,
        stale,
    }
}

/// Whether this persist cuts a new version instead of editing the target row.
///
/// Published rows are never edited for content: publishing always snapshots,
/// and a draft edit on top of a published newest row branches off it. Only
/// the newest row is ever rewritten in place.
pub(crate) fn requires_new_version(
    state: PublishedState,
    newest_published: bool,
    changes: &Changes,
) -> bool {
    if changes.content_type || changes.stale {
        return true;
    }
    match state {
        PublishedState::Publishing => true,
        PublishedState::Saving => newest_published,
        PublishedState::Unpublishing => changes.content && newest_published,
        PublishedState::Published | PublishedState::Unpublished => false,
    }
}

pub(crate) fn document_row(document: &Document) -> DocumentRow {
    DocumentRow {
        node_id: document.id,
        version_id: document.version_id,
        published: document.published,
        newest: true,
        document_user: document.writer_id,
        text: document.name.clone(),
        update_date: document.update_date.clone(),
        template_id: document.template.as_ref().map(|t| t.id),
    }
}

impl ContentRepository {
    pub(crate) async fn load_snapshot<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &Document,
    ) -> Result<StoredSnapshot, ContentError> {
        let id = document.id;
        let not_found = |what: &str| ContentError::NotFound(format!("{what} for node {id}"));

        let node = tx
            .fetch_optional(Query::<NodeRow>::new().eq("id", id))
            .await?
            .ok_or_else(|| not_found("node"))?;
        let content = tx
            .fetch_optional(Query::<ContentRow>::new().eq("node_id", id))
            .await?
            .ok_or_else(|| not_found("content row"))?;

        let rows = tx.fetch(Query::<DocumentRow>::new().eq("node_id", id)).await?;
        let newest = rows
            .iter()
            .find(|r| r.newest)
            .cloned()
            .ok_or_else(|| not_found("newest version"))?;
        let published_version = rows.iter().find(|r| r.published).map(|r| r.version_id);
        let current = rows
            .into_iter()
            .find(|r| r.version_id == document.version_id)
            .unwrap_or_else(|| newest.clone());

        let version = tx
            .fetch_optional(Query::<ContentVersionRow>::new().eq("version_id", current.version_id))
            .await?
            .ok_or_else(|| not_found("version row"))?;
        let properties = tx
            .fetch(Query::<PropertyDataRow>::new().eq("version_id", current.version_id))
            .await?;

        Ok(StoredSnapshot {
            node,
            content,
            newest,
            current,
            version,
            published_version,
            properties,
        })
    }

    /// Insert a fresh version and document row, or rewrite the target rows in place.
    pub(crate) async fn write_version<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &Document,
        new_version: bool,
        snapshot: Option<&StoredSnapshot>,
    ) -> Result<(), ContentError> {
        let row = document_row(document);
        let mut version = ContentVersionRow {
            id: 0,
            node_id: document.id,
            version_id: document.version_id,
            version_date: document.version_date.clone(),
        };

        match snapshot {
            Some(snapshot) if !new_version => {
                version.id = snapshot.version.id;
                tx.update(&version).await?;
                tx.update(&row).await?;
            }
            _ => {
                tx.insert_returning_id(&version).await?;
                tx.insert(&row).await?;
            }
        }
        Ok(())
    }

    /// Delete one version unless it is the newest. Returns whether anything
    /// was removed.
    pub async fn delete_version<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        version_id: Uuid,
    ) -> Result<bool, ContentError> {
        let row = tx
            .fetch_optional(Query::<DocumentRow>::new().eq("version_id", version_id))
            .await?;

        match row {
            Some(row) if !row.newest => {
                self.remove_version_rows(tx, version_id).await?;
                tracing::debug!(node_id = row.node_id, %version_id, "deleted version");
                Ok(true)
            }
            Some(_) => {
                tracing::debug!(%version_id, "refusing to delete newest version");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Delete every historical version of `node_id` dated before `before`.
    /// The newest version is kept. Returns the number removed.
    pub async fn delete_versions_before<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        node_id: i64,
        before: &StorageDatetime,
    ) -> Result<u64, ContentError> {
        let rows = tx
            .fetch(
                Query::<DocumentRow>::new()
                    .join("content_version", "version_id", "version_id")
                    .eq("content_document.node_id", node_id)
                    .eq("content_document.newest", false)
                    .lt("content_version.version_date", before),
            )
            .await?;

        for row in &rows {
            self.remove_version_rows(tx, row.version_id).await?;
        }
        tracing::debug!(node_id, removed = rows.len(), "deleted historical versions");
        Ok(rows.len() as u64)
    }

    async fn remove_version_rows<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        version_id: Uuid,
    ) -> Result<(), ContentError> {
        tx.delete(Delete::<PropertyDataRow>::new().eq("version_id", version_id))
            .await?;
        tx.delete(Delete::<DocumentRow>::new().eq("version_id", version_id))
            .await?;
        tx.delete(Delete::<ContentVersionRow>::new().eq("version_id", version_id))
            .await?;
        Ok(())
    }
}
