//! Reads: query shapes, ordering and hydration of stored rows into documents.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::model::{ContentType, Document, DocumentDefinition, Page, PublishedState, Template};
use crate::rows::{ContentRow, ContentVersionRow, DocumentRow, NodeRow};
use crate::{
    Aggregate, ContentError, ContentRepository, Filter, Order, Query, TransactionExecutor, Value,
};

const DOCUMENT: &str = "content_document";
const VERSION: &str = "content_version";
const NODE: &str = "content_node";
const CONTENT: &str = "content_content";

/// Filters over documents, expressed against the joined document tables.
#[derive(Debug, Clone, Default)]
pub struct ContentQuery {
    filters: Vec<Filter>,
}

impl ContentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_id(self, parent_id: i64) -> Self {
        self.filter(Filter::Eq(format!("{NODE}.parent_id"), Value::Int(parent_id)))
    }

    pub fn level(self, level: i32) -> Self {
        self.filter(Filter::Eq(format!("{NODE}.level"), Value::from(level)))
    }

    /// Descendants of the node with this path, the node itself included.
    pub fn path_starts_with(self, prefix: impl Into<String>) -> Self {
        self.filter(Filter::StartsWith(format!("{NODE}.path"), prefix.into()))
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.filter(Filter::Eq(format!("{NODE}.text"), Value::String(name.into())))
    }

    pub fn name_starts_with(self, prefix: impl Into<String>) -> Self {
        self.filter(Filter::StartsWith(format!("{NODE}.text"), prefix.into()))
    }

    pub fn content_type(self, content_type_id: i64) -> Self {
        self.filter(Filter::Eq(
            format!("{CONTENT}.content_type_id"),
            Value::Int(content_type_id),
        ))
    }

    pub fn trashed(self, trashed: bool) -> Self {
        self.filter(Filter::Eq(format!("{NODE}.trashed"), Value::Bool(trashed)))
    }

    pub fn ids(self, ids: &[i64]) -> Self {
        self.filter(Filter::In(format!("{NODE}.id"), Value::from(ids)))
    }

    /// Raw filter. Field names must be qualified with their table.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

/// One page request for [`ContentRepository::get_paged`].
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Zero-based.
    pub page_index: u64,
    pub page_size: u64,
    /// Order-by field name, see [`order_by_column`].
    pub order_by: Option<String>,
    pub direction: Order,
    /// Restrict to newest versions. When off every version row is paged.
    pub newest: bool,
    /// Extra filter applied on top of the query.
    pub filter: Option<ContentQuery>,
}

impl PageRequest {
    pub fn new(page_index: u64, page_size: u64) -> Self {
        Self {
            page_index,
            page_size,
            order_by: None,
            direction: Order::Asc,
            newest: true,
            filter: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Order) -> Self {
        self.order_by = Some(field.into());
        self.direction = direction;
        self
    }

    pub fn filter(mut self, filter: ContentQuery) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn all_versions(mut self) -> Self {
        self.newest = false;
        self
    }
}

/// Column a paging order-by field name sorts on. Case-insensitive.
pub fn order_by_column(field: &str) -> Result<&'static str, ContentError> {
    let column = match field.to_uppercase().as_str() {
        "UPDATER" => "content_document.document_user",
        "PUBLISHED" => "content_document.published",
        "NAME" => "content_node.text",
        "SORTORDER" => "content_node.sort_order",
        "LEVEL" => "content_node.level",
        "PATH" => "content_node.path",
        "ID" => "content_node.id",
        "CREATEDATE" => "content_node.create_date",
        "UPDATEDATE" => "content_version.version_date",
        "OWNER" => "content_node.user_id",
        _ => {
            return Err(ContentError::NotSupported(format!(
                "ordering by {field} is not supported"
            )));
        }
    };
    Ok(column)
}

/// Rows joined to a batch of document rows, one query per table.
#[derive(Default)]
struct Related {
    nodes: HashMap<i64, NodeRow>,
    contents: HashMap<i64, ContentRow>,
    versions: HashMap<Uuid, ContentVersionRow>,
    published: HashMap<i64, Uuid>,
}

fn build_document(
    row: &DocumentRow,
    node: &NodeRow,
    version: &ContentVersionRow,
    content_type: Arc<ContentType>,
    template: Option<Template>,
    published_version: Option<Uuid>,
) -> Document {
    Document {
        id: node.id,
        key: node.unique_id,
        parent_id: node.parent_id,
        name: row.text.clone(),
        path: node.path.clone(),
        level: node.level,
        sort_order: node.sort_order,
        trashed: node.trashed,
        creator_id: node.user_id,
        writer_id: row.document_user,
        create_date: node.create_date.clone(),
        update_date: row.update_date.clone(),
        version_id: row.version_id,
        version_date: version.version_date.clone(),
        content_type,
        template,
        published: row.published,
        published_version,
        properties: Vec::new(),
        published_state: if row.published {
            PublishedState::Published
        } else {
            PublishedState::Unpublished
        },
        permissions_changed: false,
    }
}

impl ContentRepository {
    /// Document rows joined to their version, node and content rows,
    /// restricted to this engine's object type.
    fn base_query(&self) -> Query<DocumentRow> {
        Query::<DocumentRow>::new()
            .join(VERSION, "version_id", "version_id")
            .join(NODE, "node_id", "id")
            .join(CONTENT, "node_id", "node_id")
            .eq(format!("{NODE}.node_object_type"), self.config.object_type)
    }

    fn tree_ordered(query: Query<DocumentRow>) -> Query<DocumentRow> {
        query
            .order_by(format!("{NODE}.level"), Order::Asc)
            .order_by(format!("{NODE}.sort_order"), Order::Asc)
    }

    /// Newest version of a node.
    pub async fn get<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        id: i64,
    ) -> Result<Option<Document>, ContentError> {
        let rows = tx
            .fetch(
                self.base_query()
                    .eq(format!("{NODE}.id"), id)
                    .eq(format!("{DOCUMENT}.newest"), true)
                    .order_by(format!("{VERSION}.version_date"), Order::Desc)
                    .limit(1),
            )
            .await?;
        Ok(self.hydrate(tx, rows, true).await?.into_iter().next())
    }

    /// A specific version, newest or not.
    pub async fn get_by_version<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        version_id: Uuid,
    ) -> Result<Option<Document>, ContentError> {
        let rows = tx
            .fetch(
                self.base_query()
                    .eq(format!("{DOCUMENT}.version_id"), version_id)
                    .limit(1),
            )
            .await?;
        Ok(self.hydrate(tx, rows, true).await?.into_iter().next())
    }

    /// Newest versions of the given nodes, or of every node when `ids` is empty.
    pub async fn get_all<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        ids: &[i64],
    ) -> Result<Vec<Document>, ContentError> {
        let mut query = self.base_query().eq(format!("{DOCUMENT}.newest"), true);
        if !ids.is_empty() {
            query = query.r#in(format!("{NODE}.id"), ids);
        }
        let rows = tx.fetch(Self::tree_ordered(query)).await?;
        self.hydrate(tx, rows, false).await
    }

    /// Newest versions matching `query`, ordered by level then sort order.
    pub async fn get_by_query<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        query: &ContentQuery,
    ) -> Result<Vec<Document>, ContentError> {
        let query = self
            .base_query()
            .eq(format!("{DOCUMENT}.newest"), true)
            .filters(query.filters().iter().cloned());
        let rows = tx.fetch(Self::tree_ordered(query)).await?;
        self.hydrate(tx, rows, false).await
    }

    /// Published versions matching `query`, ordered by level then sort order.
    ///
    /// A cached document is used in place of a database read only when the
    /// cached copy is itself published.
    pub async fn get_by_published_query<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        query: &ContentQuery,
    ) -> Result<Vec<Document>, ContentError> {
        let query = self
            .base_query()
            .eq(format!("{DOCUMENT}.published"), true)
            .filters(query.filters().iter().cloned());
        let rows = tx.fetch(Self::tree_ordered(query)).await?;

        let mut slots: Vec<Result<Document, Uuid>> = Vec::with_capacity(rows.len());
        let mut missing = Vec::new();
        for row in rows {
            match self.cached_published(row.node_id) {
                Some(cached) => slots.push(Ok(cached)),
                None => {
                    slots.push(Err(row.version_id));
                    missing.push(row);
                }
            }
        }

        let cache_hits = slots.len() - missing.len();
        let mut loaded: HashMap<Uuid, Document> = self
            .hydrate(tx, missing, false)
            .await?
            .into_iter()
            .map(|d| (d.version_id, d))
            .collect();
        tracing::trace!(cache_hits, loaded = loaded.len(), "published query");

        Ok(slots
            .into_iter()
            .filter_map(|slot| match slot {
                Ok(cached) => Some(cached),
                Err(version_id) => loaded.remove(&version_id),
            })
            .collect())
    }

    fn cached_published(&self, node_id: i64) -> Option<Document> {
        self.cache
            .as_ref()?
            .get(node_id)
            .filter(|document| document.published)
    }

    /// One page of documents matching `query` plus the total match count.
    pub async fn get_paged<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        query: &ContentQuery,
        request: &PageRequest,
    ) -> Result<Page<Document>, ContentError> {
        if request.page_size == 0 {
            return Err(ContentError::InvalidArgument("page size must be positive".to_string()));
        }
        let order_column = request.order_by.as_deref().map(order_by_column).transpose()?;

        let mut filtered = self.base_query().filters(query.filters().iter().cloned());
        if request.newest {
            filtered = filtered.eq(format!("{DOCUMENT}.newest"), true);
        }
        if let Some(extra) = &request.filter {
            filtered = filtered.filters(extra.filters().iter().cloned());
        }

        let total_records = tx
            .aggregate(filtered.unpaged(), Aggregate::Count)
            .await?
            .unwrap_or(0);
        let total_records = u64::try_from(total_records).unwrap_or(0);

        let mut paged = filtered;
        if let Some(column) = order_column {
            paged = paged.order_by(column, request.direction);
        }
        let paged = Self::tree_ordered(paged)
            .order_by(format!("{NODE}.id"), Order::Asc)
            .offset(request.page_index.saturating_mul(request.page_size))
            .limit(request.page_size);

        let rows = tx.fetch(paged).await?;
        let items = self.hydrate(tx, rows, false).await?;
        tracing::debug!(
            page_index = request.page_index,
            page_size = request.page_size,
            returned = items.len(),
            total_records,
            "paged query"
        );
        Ok(Page {
            items,
            total_records,
        })
    }

    /// Newest documents matching `query`.
    pub async fn count<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        query: &ContentQuery,
    ) -> Result<u64, ContentError> {
        let query = self
            .base_query()
            .eq(format!("{DOCUMENT}.newest"), true)
            .filters(query.filters().iter().cloned());
        let count = tx.aggregate(query, Aggregate::Count).await?.unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Published, non-trashed documents, optionally of one content type.
    /// An unknown alias counts zero.
    pub async fn count_published<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        content_type_alias: Option<&str>,
    ) -> Result<u64, ContentError> {
        let mut query = self
            .base_query()
            .eq(format!("{DOCUMENT}.published"), true)
            .eq(format!("{NODE}.trashed"), false);

        if let Some(alias) = content_type_alias {
            match self.content_types.get_by_alias(alias).await? {
                Some(content_type) => {
                    query = query.eq(format!("{CONTENT}.content_type_id"), content_type.id);
                }
                None => return Ok(0),
            }
        }

        let count = tx.aggregate(query, Aggregate::Count).await?.unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub async fn exists<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        id: i64,
    ) -> Result<bool, ContentError> {
        Ok(tx
            .exists(
                Query::<NodeRow>::new()
                    .eq("id", id)
                    .eq("node_object_type", self.config.object_type),
            )
            .await?)
    }

    async fn load_related<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        rows: &[DocumentRow],
    ) -> Result<Related, ContentError> {
        let node_ids: Vec<i64> = rows
            .iter()
            .map(|r| r.node_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let version_ids: Vec<Uuid> = rows.iter().map(|r| r.version_id).collect();

        let nodes = tx
            .fetch(Query::<NodeRow>::new().r#in("id", node_ids.as_slice()))
            .await?;
        let contents = tx
            .fetch(Query::<ContentRow>::new().r#in("node_id", node_ids.as_slice()))
            .await?;
        let versions = tx
            .fetch(Query::<ContentVersionRow>::new().r#in("version_id", version_ids))
            .await?;
        let published = tx
            .fetch(
                Query::<DocumentRow>::new()
                    .r#in("node_id", node_ids)
                    .eq("published", true),
            )
            .await?;

        Ok(Related {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            contents: contents.into_iter().map(|c| (c.node_id, c)).collect(),
            versions: versions.into_iter().map(|v| (v.version_id, v)).collect(),
            published: published
                .into_iter()
                .map(|d| (d.node_id, d.version_id))
                .collect(),
        })
    }

    async fn resolve_content_types(
        &self,
        ids: Vec<i64>,
        single: bool,
    ) -> Result<HashMap<i64, Arc<ContentType>>, ContentError> {
        let found = if single {
            let mut found = Vec::new();
            for id in ids {
                found.extend(self.content_types.get(id).await?);
            }
            found
        } else {
            self.content_types.get_all(&ids).await?
        };
        Ok(found.into_iter().map(|ct| (ct.id, Arc::new(ct))).collect())
    }

    async fn resolve_templates(
        &self,
        ids: Vec<i64>,
        single: bool,
    ) -> Result<HashMap<i64, Template>, ContentError> {
        let found = if single {
            let mut found = Vec::new();
            for id in ids {
                found.extend(self.templates.get(id).await?);
            }
            found
        } else {
            self.templates.get_all(&ids).await?
        };
        Ok(found.into_iter().map(|t| (t.id, t)).collect())
    }

    /// Turn document rows into documents, keeping row order.
    ///
    /// Rows whose node, version or content type cannot be resolved are
    /// skipped with a warning.
    async fn hydrate<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        rows: Vec<DocumentRow>,
        single: bool,
    ) -> Result<Vec<Document>, ContentError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let related = self.load_related(tx, &rows).await?;

        let content_type_ids: Vec<i64> = related
            .contents
            .values()
            .map(|c| c.content_type_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let content_types = self.resolve_content_types(content_type_ids, single).await?;

        let template_ids: Vec<i64> = rows
            .iter()
            .filter_map(|r| r.template_id)
            .filter(|id| *id > 0)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let templates = self.resolve_templates(template_ids, single).await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(node) = related.nodes.get(&row.node_id) else {
                tracing::warn!(node_id = row.node_id, "document row without node, skipping");
                continue;
            };
            let Some(version) = related.versions.get(&row.version_id) else {
                tracing::warn!(version_id = %row.version_id, "document row without version, skipping");
                continue;
            };
            let content_type = related
                .contents
                .get(&row.node_id)
                .and_then(|c| content_types.get(&c.content_type_id));
            let Some(content_type) = content_type else {
                tracing::warn!(node_id = row.node_id, "content type not found, skipping");
                continue;
            };
            let template = row
                .template_id
                .and_then(|id| templates.get(&id))
                .cloned();

            documents.push(build_document(
                row,
                node,
                version,
                Arc::clone(content_type),
                template,
                related.published.get(&row.node_id).copied(),
            ));
        }

        let definitions: Vec<DocumentDefinition> = documents
            .iter()
            .map(|d| DocumentDefinition {
                node_id: d.id,
                version_id: d.version_id,
                version_date: d.version_date.clone(),
                create_date: d.create_date.clone(),
                content_type: Arc::clone(&d.content_type),
            })
            .collect();
        let mut properties = self.load_property_collections(tx, &definitions).await?;
        for document in &mut documents {
            document.properties = properties.remove(&document.version_id).unwrap_or_default();
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_fields_map_to_qualified_columns() {
        assert_eq!(order_by_column("name").unwrap(), "content_node.text");
        assert_eq!(order_by_column("UPDATEDATE").unwrap(), "content_version.version_date");
        assert_eq!(order_by_column("Owner").unwrap(), "content_node.user_id");
    }

    #[test]
    fn unknown_order_fields_are_not_supported() {
        assert!(matches!(order_by_column("CONTENTTYPEALIAS"), Err(ContentError::NotSupported(_))));
        assert!(matches!(order_by_column("colour"), Err(ContentError::NotSupported(_))));
    }

    #[test]
    fn content_query_qualifies_fields() {
        let query = ContentQuery::new().parent_id(1050).trashed(false).path_starts_with("-1,1050,");
        let fields: Vec<_> = query.filters().iter().map(Filter::field).collect();
        assert_eq!(fields, vec!["content_node.parent_id", "content_node.trashed", "content_node.path"]);
    }
}
