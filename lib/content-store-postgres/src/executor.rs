//! PostgreSQL implementation of QueryExecutor.

const DEFAULT_MAX_CONNECTIONS: u32 = 16;

use async_trait::async_trait;
use content_store::{
    Aggregate, ConnectionConfig, Delete, Filter, Join, Order, Query, QueryExecutor,
    RepositoryConnection, Storable, StorageError, TransactionExecutor, Value,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, Postgres, Row, Transaction};
use std::ops::Deref;

use crate::deserialize_row;
use crate::serde_bind::{insert_returning_statement, insert_statement, update_statement};

fn storage_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::StorageError(e.to_string())
}

/// Wrapper around sqlx::PgPool that implements QueryExecutor.
#[derive(Clone, Debug)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    /// Create a new PgPool from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect to a PostgreSQL database.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(storage_error)?;
        Ok(Self(pool))
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }
}

impl Deref for PgPool {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl RepositoryConnection for PgPool {
    async fn connect(config: impl Into<ConnectionConfig> + Send) -> Result<Self, StorageError> {
        let ConnectionConfig::Url(url) = config.into();
        PgPool::connect(&url).await
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.0)
            .await
            .map_err(storage_error)?;
        tracing::info!("content store schema is up to date");
        Ok(())
    }
}

/// Qualify a bare field with the main table when the query joins others.
fn qualify(table: &str, field: &str, joined: bool) -> String {
    if joined && !field.contains('.') {
        format!("{}.{}", table, field)
    } else {
        field.to_string()
    }
}

/// Escape LIKE wildcards so a prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Build a WHERE clause from filters and return the SQL and argument count.
fn build_where_clause(
    table: &str,
    filters: &[Filter],
    joined: bool,
    start_param: usize,
) -> (String, usize) {
    if filters.is_empty() {
        return (String::new(), 0);
    }

    let mut clauses = Vec::new();
    let mut param_idx = start_param;

    for filter in filters {
        let field = qualify(table, filter.field(), joined);
        let op = match filter {
            Filter::Eq(..) => Some("="),
            Filter::Ne(..) => Some("!="),
            Filter::Gt(..) => Some(">"),
            Filter::Gte(..) => Some(">="),
            Filter::Lt(..) => Some("<"),
            Filter::Lte(..) => Some("<="),
            _ => None,
        };
        let clause = match (filter, op) {
            (_, Some(op)) => {
                let c = format!("{} {} ${}", field, op, param_idx);
                param_idx += 1;
                c
            }
            (Filter::In(..), None) => {
                let c = format!("{} = ANY(${})", field, param_idx);
                param_idx += 1;
                c
            }
            (Filter::StartsWith(..), None) => {
                let c = format!("{} LIKE ${} ESCAPE '\\'", field, param_idx);
                param_idx += 1;
                c
            }
            (Filter::IsNull(_), None) => format!("{} IS NULL", field),
            (_, None) => format!("{} IS NOT NULL", field),
        };
        clauses.push(clause);
    }

    let param_count = param_idx - start_param;
    (format!(" WHERE {}", clauses.join(" AND ")), param_count)
}

/// Bind filter values to PgArguments.
fn bind_filters(args: &mut PgArguments, filters: &[Filter]) -> Result<(), StorageError> {
    for filter in filters {
        match filter {
            Filter::Eq(_, value)
            | Filter::Ne(_, value)
            | Filter::Gt(_, value)
            | Filter::Gte(_, value)
            | Filter::Lt(_, value)
            | Filter::Lte(_, value)
            | Filter::In(_, value) => {
                bind_value(args, value)?;
            }
            Filter::StartsWith(_, prefix) => {
                args.add(like_prefix(prefix)).map_err(storage_error)?;
            }
            Filter::IsNull(_) | Filter::IsNotNull(_) => {
                // No binding needed
            }
        }
    }
    Ok(())
}

/// Bind a Value to PgArguments.
fn bind_value(args: &mut PgArguments, value: &Value) -> Result<(), StorageError> {
    match value {
        Value::String(s) => args.add(s.as_str()),
        Value::Int(n) => args.add(*n),
        Value::UInt(n) => args.add(i64::try_from(*n).map_err(storage_error)?),
        Value::Float(n) => args.add(*n),
        Value::Bool(b) => args.add(*b),
        Value::Uuid(u) => args.add(*u),
        Value::Strings(v) => args.add(v.as_slice()),
        Value::Ints(v) => args.add(v.as_slice()),
        Value::Uuids(v) => args.add(v.as_slice()),
        Value::Datetime(dt) => args.add(*dt.inner()),
        Value::Null => args.add(None::<String>),
    }
    .map_err(storage_error)
}

/// Build ORDER BY clause.
fn build_order_clause(table: &str, order_by: &[(String, Order)], joined: bool) -> String {
    if order_by.is_empty() {
        return String::new();
    }

    let clauses: Vec<String> = order_by
        .iter()
        .map(|(field, order)| {
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            format!("{} {}", qualify(table, field, joined), dir)
        })
        .collect();

    format!(" ORDER BY {}", clauses.join(", "))
}

/// Build JOIN clauses.
fn build_join_clause(main_table: &str, joins: &[Join]) -> String {
    if joins.is_empty() {
        return String::new();
    }

    joins
        .iter()
        .map(|join| {
            format!(
                " JOIN {} ON {}.{} = {}.{}",
                join.table, main_table, join.left_field, join.table, join.right_field
            )
        })
        .collect::<Vec<_>>()
        .join("")
}

/// SELECT `projection` with the query's joins, filters, ordering and paging.
fn build_select<T>(query: &Query<T>, projection: &str) -> Result<(String, PgArguments), StorageError> {
    let joined = !query.joins.is_empty();
    let join_clause = build_join_clause(&query.table, &query.joins);
    let (where_clause, _) = build_where_clause(&query.table, &query.filters, joined, 1);
    let order_clause = build_order_clause(&query.table, &query.order_by, joined);

    let mut sql = format!(
        "SELECT {} FROM {}{}{}{}",
        projection, query.table, join_clause, where_clause, order_clause
    );

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    let mut args = PgArguments::default();
    bind_filters(&mut args, &query.filters)?;
    Ok((sql, args))
}

/// Use table.* when joining to only return columns from the main table
fn row_projection<T>(query: &Query<T>) -> String {
    if query.joins.is_empty() {
        "*".to_string()
    } else {
        format!("{}.*", query.table)
    }
}

fn aggregate_projection<T>(query: &Query<T>, aggregate: &Aggregate) -> String {
    match aggregate {
        Aggregate::Count => "COUNT(*)".to_string(),
        Aggregate::Max(column) => format!(
            "MAX({})::BIGINT",
            qualify(&query.table, column, !query.joins.is_empty())
        ),
    }
}

fn build_delete<T>(delete: &Delete<T>) -> Result<(String, PgArguments), StorageError> {
    let (where_clause, _) = build_where_clause(&delete.table, &delete.filters, false, 1);
    let sql = format!("DELETE FROM {}{}", delete.table, where_clause);

    let mut args = PgArguments::default();
    bind_filters(&mut args, &delete.filters)?;
    Ok((sql, args))
}

#[async_trait]
impl QueryExecutor for PgPool {
    type Transaction = PgTransaction;

    async fn fetch<T: Storable + DeserializeOwned + Send>(
        &self,
        query: Query<T>,
    ) -> Result<Vec<T>, StorageError> {
        let (sql, args) = build_select(&query, &row_projection(&query))?;

        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&self.0)
            .await
            .map_err(storage_error)?;

        rows.iter().map(|row| deserialize_row::<T>(row)).collect()
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
        let (inner, args) = build_select(&query.unpaged(), "1")?;
        let sql = format!("SELECT EXISTS({})", inner);

        let row = sqlx::query_with(&sql, args)
            .fetch_one(&self.0)
            .await
            .map_err(storage_error)?;

        row.try_get::<bool, _>(0).map_err(storage_error)
    }

    async fn begin_transaction(&self) -> Result<Self::Transaction, StorageError> {
        let tx = self.0.begin().await.map_err(storage_error)?;
        Ok(PgTransaction { tx })
    }
}

/// PostgreSQL transaction wrapper implementing TransactionExecutor.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransactionExecutor for PgTransaction {
    async fn fetch<T: Storable + DeserializeOwned + Send>(
        &mut self,
        query: Query<T>,
    ) -> Result<Vec<T>, StorageError> {
        let (sql, args) = build_select(&query, &row_projection(&query))?;

        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        rows.iter().map(|row| deserialize_row::<T>(row)).collect()
    }

    async fn aggregate<T: Storable + Send>(
        &mut self,
        query: Query<T>,
        aggregate: Aggregate,
    ) -> Result<Option<i64>, StorageError> {
        let projection = aggregate_projection(&query, &aggregate);
        let (sql, args) = build_select(&query.unpaged(), &projection)?;

        let row = sqlx::query_with(&sql, args)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        row.try_get::<Option<i64>, _>(0).map_err(storage_error)
    }

    async fn delete<T: Storable + Send>(&mut self, delete: Delete<T>) -> Result<u64, StorageError> {
        let (sql, args) = build_delete(&delete)?;

        let result = sqlx::query_with(&sql, args)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }

    async fn insert<T: Storable + Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<u64, StorageError> {
        let (sql, args) = insert_statement(item)?;

        let result = sqlx::query_with(&sql, args)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }

    async fn insert_returning_id<T: Storable + Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<i64, StorageError> {
        let (sql, args) = insert_returning_statement(item)?;

        let row = sqlx::query_with(&sql, args)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        row.try_get::<i64, _>(0).map_err(storage_error)
    }

    async fn update<T: Storable + Serialize + Send + Sync>(
        &mut self,
        item: &T,
    ) -> Result<u64, StorageError> {
        let (sql, args) = update_statement(item)?;

        let result = sqlx::query_with(&sql, args)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }

    async fn acquire_advisory_lock(&mut self, key: &str) -> Result<(), StorageError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(storage_error)
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await.map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_store::rows::{DocumentRow, NodeRow};

    #[test]
    fn joined_selects_qualify_bare_fields() {
        let query = Query::<DocumentRow>::new()
            .join("content_node", "node_id", "id")
            .eq("newest", true)
            .eq("content_node.trashed", false)
            .order_by("content_node.level", Order::Asc)
            .limit(10)
            .offset(20);
        let (sql, _) = build_select(&query, &row_projection(&query)).unwrap();

        assert_eq!(
            sql,
            "SELECT content_document.* FROM content_document \
             JOIN content_node ON content_document.node_id = content_node.id \
             WHERE content_document.newest = $1 AND content_node.trashed = $2 \
             ORDER BY content_node.level ASC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn prefix_filters_use_escaped_like() {
        let filters = vec![
            Filter::StartsWith("text".into(), "Home".into()),
            Filter::In("id".into(), Value::Ints(vec![1, 2])),
            Filter::IsNull("path".into()),
        ];
        let (clause, count) = build_where_clause("content_node", &filters, false, 1);
        assert_eq!(
            clause,
            " WHERE text LIKE $1 ESCAPE '\\' AND id = ANY($2) AND path IS NULL"
        );
        assert_eq!(count, 2);
        assert_eq!(like_prefix("50%_off"), "50\\%\\_off%");
    }

    #[test]
    fn aggregates_ignore_paging() {
        let query = Query::<NodeRow>::new()
            .eq("parent_id", -1i64)
            .order_by("sort_order", Order::Asc)
            .limit(5);
        let projection = aggregate_projection(&query, &Aggregate::Max("sort_order".into()));
        let (sql, _) = build_select(&query.unpaged(), &projection).unwrap();
        assert_eq!(
            sql,
            "SELECT MAX(sort_order)::BIGINT FROM content_node WHERE parent_id = $1"
        );
    }
}
