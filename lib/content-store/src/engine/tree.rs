//! Node identity, materialized path, level and sibling order.

use crate::rows::NodeRow;
use crate::{Aggregate, ContentError, ContentRepository, Query, Storable, TransactionExecutor};

/// Materialized path of a child of `parent_path`.
pub(crate) fn child_path(parent_path: &str, id: i64) -> String {
    format!("{parent_path},{id}")
}

/// Node ids along `path`, the root excluded.
pub(crate) fn path_ids(path: &str, root_id: i64) -> Vec<i64> {
    path.split(',')
        .filter_map(|segment| segment.trim().parse::<i64>().ok())
        .filter(|id| *id != root_id)
        .collect()
}

impl ContentRepository {
    pub(crate) async fn parent_node<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        parent_id: i64,
    ) -> Result<NodeRow, ContentError> {
        tx.fetch_optional(Query::<NodeRow>::new().eq("id", parent_id))
            .await?
            .ok_or_else(|| ContentError::NotFound(format!("parent node {parent_id}")))
    }

    /// One past the largest sort order among the children of `parent_id`,
    /// `0` for the first child.
    pub(crate) async fn next_child_sort_order<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        parent_id: i64,
    ) -> Result<i32, ContentError> {
        let max = tx
            .aggregate(
                Query::<NodeRow>::new()
                    .eq("parent_id", parent_id)
                    .eq("node_object_type", self.config.object_type),
                Aggregate::Max("sort_order".to_string()),
            )
            .await?;

        let max = max.unwrap_or(-1);
        i32::try_from(max + 1)
            .map_err(|_| ContentError::InvalidArgument(format!("sort order overflow under {parent_id}")))
    }

    /// Insert `node` with its placeholder path and record the generated id.
    pub(crate) async fn allocate_node<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        node: &mut NodeRow,
    ) -> Result<i64, ContentError> {
        let id = tx.insert_returning_id(&*node).await?;
        node.set_identity(id);
        Ok(id)
    }

    /// Rewrite the placeholder path once the id is known.
    pub(crate) async fn finalize_path<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        node: &mut NodeRow,
        parent_path: &str,
    ) -> Result<(), ContentError> {
        node.path = child_path(parent_path, node.id);
        let updated = tx.update(&*node).await?;
        if updated != 1 {
            return Err(ContentError::NotFound(format!("node {} vanished before path write", node.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_path_appends_the_id() {
        assert_eq!(child_path("-1", 1050), "-1,1050");
        assert_eq!(child_path("-1,1050", 1051), "-1,1050,1051");
    }

    #[test]
    fn path_ids_skip_root_and_garbage() {
        assert_eq!(path_ids("-1,1050,1051", -1), vec![1050, 1051]);
        assert_eq!(path_ids("-1", -1), Vec::<i64>::new());
        assert_eq!(path_ids("-1,x,7", -1), vec![7]);
    }
}
