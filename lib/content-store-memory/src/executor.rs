//! In-process implementation of QueryExecutor.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use content_store::{
    Aggregate, ConnectionConfig, Delete, Query, QueryExecutor, RepositoryConnection, Storable,
    StorageError, TransactionExecutor,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::table::Tables;

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, StorageError> {
    tables
        .lock()
        .map_err(|_| StorageError::StorageError("memory store lock poisoned".to_string()))
}

/// Shared in-process store that implements QueryExecutor.
#[derive(Clone, Debug, Default)]
pub struct MemoryPool {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed rows in `table`.
    pub fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        Ok(lock(&self.tables)?.row_count(table))
    }
}

#[async_trait]
impl RepositoryConnection for MemoryPool {
    async fn connect(config: impl Into<ConnectionConfig> + Send) -> Result<Self, StorageError> {
        let ConnectionConfig::Url(url) = config.into();
        if !url.starts_with("memory:") {
            return Err(StorageError::Unsupported(format!(
                "memory backend cannot open {url}"
            )));
        }
        Ok(Self::new())
    }

    /// Tables are created on first insert.
    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for MemoryPool {
    type Transaction = MemoryTransaction;

    async fn fetch<T: Storable + DeserializeOwned + Send>(
        &self,
        query: Query<T>,
    ) -> Result<Vec<T>, StorageError> {
        lock(&self.tables)?.fetch(&query)
    }

    async fn fetch_optional<T: Storable + DeserializeOwned + Send>(
        &self,
        query: Query<T>,
    ) -> Result<Option<T>, StorageError> {
        let mut q = query;
        q.limit = Some(1);

        let results = self.fetch(q).await?;
        Ok(results.into_iter().next())
    }

    async fn exists<T: Storable + Send>(&self, query: Query<T>) -> Result<bool, StorageError> {
        let count = lock(&self.tables)?.aggregate(&query, &Aggregate::Count)?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction, StorageError> {
        let working = lock(&self.tables)?.clone();
        Ok(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            working,
        })
    }
}

/// Snapshot transaction: reads and writes go to a private copy that replaces
/// the shared store on commit. Dropping without commit discards it.
///
/// Concurrent transactions are not merged; the last commit wins.
pub struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    working: Tables,
}

#[async_trait]
impl TransactionExecutor for MemoryTransaction {
    async fn fetch<T: Storable + DeserializeOwned + Send>(
        &mut self,
        query: Query<T>,
    ) -> Result<Vec<T>, StorageError> {
        self.working.fetch(&query)
    }

    async fn aggregate<T: Storable + Send>(
        &mut self,
        query: Query<T>,
        aggregate: Aggregate,
    ) -> Result<Option<i64>, StorageError> {
        self.working.aggregate(&query, &aggregate)
    }

    async fn delete<T: Storable + Send>(&mut self, delete: Delete<T>) -> Result<u64, StorageError> {
        Ok(self.working.delete(&delete))
    }

    async fn insert<T: Storable + Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<u64, StorageError> {
        self.working.insert(item)?;
        Ok(1)
    }

    async fn insert_returning_id<T: Storable + Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<i64, StorageError> {
        self.working.insert_generated(item)
    }

    async fn update<T: Storable + Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<u64, StorageError> {
        self.working.update(item)
    }

    /// Writers on one pool already serialize through commit.
    async fn acquire_advisory_lock(&mut self, key: &str) -> Result<(), StorageError> {
        tracing::trace!(key, "advisory lock is a no-op in memory");
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        *lock(&self.tables)? = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_store::rows::NodeRow;
    use content_store::{DOCUMENT_OBJECT_TYPE, StorageDatetime};
    use uuid::Uuid;

    fn node(text: &str) -> NodeRow {
        NodeRow {
            id: 0,
            unique_id: Uuid::new_v4(),
            parent_id: -1,
            level: 1,
            path: "-1".to_string(),
            sort_order: 0,
            trashed: false,
            user_id: 0,
            text: text.to_string(),
            node_object_type: DOCUMENT_OBJECT_TYPE,
            create_date: StorageDatetime::now(),
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let pool = MemoryPool::connect("memory://").await.unwrap();
        let mut tx = pool.begin_transaction().await.unwrap();
        tx.acquire_advisory_lock("content:a").await.unwrap();
        let id = tx.insert_returning_id(&node("a")).await.unwrap();
        tx.commit().await.unwrap();

        let found = pool
            .fetch_optional(Query::<NodeRow>::new().eq("id", id))
            .await
            .unwrap();
        assert_eq!(found.map(|n| n.text), Some("a".to_string()));
    }

    #[tokio::test]
    async fn rolled_back_writes_are_discarded() {
        let pool = MemoryPool::new();
        let mut tx = pool.begin_transaction().await.unwrap();
        tx.insert_returning_id(&node("a")).await.unwrap();
        assert!(tx.exists(Query::<NodeRow>::new()).await.unwrap());
        tx.rollback().await.unwrap();

        assert_eq!(pool.row_count("content_node").unwrap(), 0);
        assert!(!pool.exists(Query::<NodeRow>::new()).await.unwrap());
    }

    #[tokio::test]
    async fn other_urls_are_rejected() {
        let result = MemoryPool::connect("postgres://localhost/db").await;
        assert!(matches!(result, Err(StorageError::Unsupported(_))));
    }
}
