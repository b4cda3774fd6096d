//! Database-agnostic query builder for content storage.
//!
//! This module provides a query abstraction that can be translated to
//! different database backends (PostgreSQL, the in-process memory store).
//!
//! Field names may be qualified (`content_node.level`) when a query joins
//! other tables; unqualified names refer to the main table.

use crate::{Storable, StorageDatetime, StorageError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use uuid::Uuid;

/// A value that can be bound to a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    Strings(Vec<String>),
    Ints(Vec<i64>),
    Uuids(Vec<Uuid>),
    Datetime(StorageDatetime),
    Null,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Uuid> for Value {
    fn from(u: Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Strings(v)
    }
}

impl From<&[String]> for Value {
    fn from(v: &[String]) -> Self {
        Value::Strings(v.to_vec())
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Ints(v)
    }
}

impl From<&[i64]> for Value {
    fn from(v: &[i64]) -> Self {
        Value::Ints(v.to_vec())
    }
}

impl From<Vec<Uuid>> for Value {
    fn from(v: Vec<Uuid>) -> Self {
        Value::Uuids(v)
    }
}

impl From<&[Uuid]> for Value {
    fn from(v: &[Uuid]) -> Self {
        Value::Uuids(v.to_vec())
    }
}

impl From<StorageDatetime> for Value {
    fn from(dt: StorageDatetime) -> Self {
        Value::Datetime(dt)
    }
}

impl From<&StorageDatetime> for Value {
    fn from(dt: &StorageDatetime) -> Self {
        Value::Datetime(dt.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Filter conditions for queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// field = value
    Eq(String, Value),
    /// field != value
    Ne(String, Value),
    /// field > value
    Gt(String, Value),
    /// field >= value
    Gte(String, Value),
    /// field < value
    Lt(String, Value),
    /// field <= value
    Lte(String, Value),
    /// field IN (values) - for arrays
    In(String, Value),
    /// field LIKE 'value%' (case-sensitive)
    StartsWith(String, String),
    /// field IS NULL
    IsNull(String),
    /// field IS NOT NULL
    IsNotNull(String),
}

impl Filter {
    /// The field this filter applies to.
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(field, _)
            | Filter::Ne(field, _)
            | Filter::Gt(field, _)
            | Filter::Gte(field, _)
            | Filter::Lt(field, _)
            | Filter::Lte(field, _)
            | Filter::In(field, _)
            | Filter::StartsWith(field, _)
            | Filter::IsNull(field)
            | Filter::IsNotNull(field) => field,
        }
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Aggregate computed by [`TransactionExecutor::aggregate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// COUNT(*) over the matching rows.
    Count,
    /// MAX(column) over the matching rows, `None` when no row matches.
    Max(String),
}

/// A JOIN clause.
#[derive(Debug, Clone)]
pub struct Join {
    /// The table to join.
    pub table: String,
    /// The field on the left table (main table).
    pub left_field: String,
    /// The field on the right table (joined table).
    pub right_field: String,
}

/// A SELECT query builder.
#[derive(Debug, Clone)]
pub struct Query<T> {
    /// The table to query.
    pub table: String,
    /// JOIN clauses.
    pub joins: Vec<Join>,
    /// Filter conditions.
    pub filters: Vec<Filter>,
    /// Order by clauses.
    pub order_by: Vec<(String, Order)>,
    /// Maximum number of results.
    pub limit: Option<u64>,
    /// Offset for pagination.
    pub offset: Option<u64>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Storable> Query<T> {
    /// Create a new query for the type's table.
    pub fn new() -> Self {
        Self::for_table(T::table_name())
    }

    /// Create a new query with an explicit table name.
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            joins: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }

    /// Add a JOIN clause.
    ///
    /// Joins `join_table` where `left_field` (on main table) equals `right_field` (on join table).
    pub fn join(
        mut self,
        join_table: impl Into<String>,
        left_field: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            table: join_table.into(),
            left_field: left_field.into(),
            right_field: right_field.into(),
        });
        self
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add several filter conditions.
    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Add an equality filter (shorthand for Filter::Eq).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    /// Add an inequality filter.
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Ne(field.into(), value.into()))
    }

    /// Add an IN filter (shorthand for Filter::In).
    pub fn r#in(self, field: impl Into<String>, values: impl Into<Value>) -> Self {
        self.filter(Filter::In(field.into(), values.into()))
    }

    /// Add a case-sensitive prefix filter.
    pub fn starts_with(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filter(Filter::StartsWith(field.into(), prefix.into()))
    }

    /// Add a greater-than filter.
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gt(field.into(), value.into()))
    }

    /// Add a greater-than-or-equal filter.
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(field.into(), value.into()))
    }

    /// Add a less-than filter.
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(field.into(), value.into()))
    }

    /// Add a less-than-or-equal filter.
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(field.into(), value.into()))
    }

    /// Add an order-by clause.
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    /// Set the maximum number of results.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset for pagination.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Same joins and filters, without ordering or paging. Used for counts.
    pub fn unpaged(&self) -> Self {
        Self {
            table: self.table.clone(),
            joins: self.joins.clone(),
            filters: self.filters.clone(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }
}

impl<T: Storable> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A DELETE query builder.
#[derive(Debug, Clone)]
pub struct Delete<T> {
    /// The table to delete from.
    pub table: String,
    /// Filter conditions.
    pub filters: Vec<Filter>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Storable> Delete<T> {
    /// Create a new delete query for the type's table.
    pub fn new() -> Self {
        Self {
            table: T::table_name().to_string(),
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    /// Add an IN filter.
    pub fn r#in(self, field: impl Into<String>, values: impl Into<Value>) -> Self {
        self.filter(Filter::In(field.into(), values.into()))
    }
}

impl<T: Storable> Default for Delete<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for executing queries against a database backend outside a transaction.
///
/// Implemented by backend pool types (e.g., PgPool, MemoryPool).
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// The transaction type for this executor.
    type Transaction: TransactionExecutor;

    /// Execute a SELECT query and return results.
    async fn fetch<T: Storable + DeserializeOwned + Send>(
        &self,
        query: Query<T>,
    ) -> Result<Vec<T>, StorageError>;

    /// Execute a SELECT query and return at most one result.
    async fn fetch_optional<T: Storable + DeserializeOwned + Send>(
        &self,
        query: Query<T>,
    ) -> Result<Option<T>, StorageError>;

    /// Check if any rows match the query (SELECT EXISTS).
    async fn exists<T: Storable + Send>(&self, query: Query<T>) -> Result<bool, StorageError>;

    /// Begin a transaction. The returned executor is the unit of work for every engine call.
    async fn begin_transaction(&self) -> Result<Self::Transaction, StorageError>;
}

/// Trait for executing queries within a transaction.
///
/// Every statement issued through one value of this type commits or rolls
/// back together.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// Execute a SELECT query within the transaction.
    async fn fetch<T: Storable + DeserializeOwned + Send>(
        &mut self,
        query: Query<T>,
    ) -> Result<Vec<T>, StorageError>;

    /// Execute a SELECT query and return at most one result.
    async fn fetch_optional<T: Storable + DeserializeOwned + Send>(
        &mut self,
        query: Query<T>,
    ) -> Result<Option<T>, StorageError> {
        let mut q = query;
        q.limit = Some(1);

        let results = self.fetch(q).await?;
        Ok(results.into_iter().next())
    }

    /// Check if any rows match the query.
    async fn exists<T: Storable + Send>(&mut self, query: Query<T>) -> Result<bool, StorageError> {
        let count = self.aggregate(query, Aggregate::Count).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// Compute a scalar aggregate over the rows matching the query.
    async fn aggregate<T: Storable + Send>(
        &mut self,
        query: Query<T>,
        aggregate: Aggregate,
    ) -> Result<Option<i64>, StorageError>;

    /// Execute a DELETE query within the transaction.
    async fn delete<T: Storable + Send>(&mut self, delete: Delete<T>) -> Result<u64, StorageError>;

    /// Insert an item within the transaction. Returns rows affected.
    async fn insert<T: Storable + serde::Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<u64, StorageError>;

    /// Insert an item whose identity column the database generates and return the new id.
    async fn insert_returning_id<T: Storable + serde::Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<i64, StorageError>;

    /// Update the row addressed by the item's key column. Returns rows affected.
    async fn update<T: Storable + serde::Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<u64, StorageError>;

    /// Acquire an advisory lock scoped to this transaction.
    /// The lock is automatically released on commit/rollback.
    /// Used to serialize writers on one node.
    async fn acquire_advisory_lock(&mut self, key: &str) -> Result<(), StorageError>;

    /// Commit the transaction.
    async fn commit(self) -> Result<(), StorageError>;

    /// Rollback the transaction.
    async fn rollback(self) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::NodeRow;

    #[test]
    fn builder_collects_clauses_in_order() {
        let query = Query::<NodeRow>::new()
            .join("content_document", "id", "node_id")
            .eq("content_node.parent_id", -1i64)
            .starts_with("content_node.text", "Home")
            .order_by("content_node.level", Order::Asc)
            .order_by("content_node.sort_order", Order::Asc)
            .limit(10)
            .offset(20);

        assert_eq!(query.table, "content_node");
        assert_eq!(query.joins.len(), 1);
        assert_eq!(query.filters[1].field(), "content_node.text");
        assert_eq!(query.order_by[0].0, "content_node.level");
        assert_eq!(query.limit, Some(10));

        let count = query.unpaged();
        assert!(count.order_by.is_empty());
        assert_eq!(count.limit, None);
        assert_eq!(count.filters.len(), 2);
    }

    #[test]
    fn option_values_map_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }
}
