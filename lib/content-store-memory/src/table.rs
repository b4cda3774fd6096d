//! Row storage and query evaluation over JSON rows.
//!
//! Rows are stored keyed by column name (snake_case), the same shape the
//! PostgreSQL backend reads back from a result row.

use std::cmp::Ordering;
use std::collections::HashMap;

use content_store::{Aggregate, Delete, Filter, Order, Query, Storable, StorageError, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

pub(crate) type Row = Map<String, JsonValue>;

/// Every table plus the identity sequence of each.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    rows: HashMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
}

/// Serialize an item into a row keyed by column name.
pub(crate) fn to_row<T: Storable + Serialize>(item: &T) -> Result<Row, StorageError> {
    let json = serde_json::to_value(item)?;
    let obj = json.as_object().ok_or_else(|| {
        StorageError::StorageError("Expected JSON object for Storable type".to_string())
    })?;

    let mut row = Row::new();
    for (column, json_key) in T::columns().iter().zip(T::json_keys()) {
        let value = obj.get(*json_key).cloned().unwrap_or(JsonValue::Null);
        row.insert((*column).to_string(), value);
    }
    Ok(row)
}

/// Deserialize a row back into its type. Null values are omitted so
/// optional fields fall back to their serde defaults.
pub(crate) fn from_row<T: Storable + DeserializeOwned>(row: &Row) -> Result<T, StorageError> {
    let mut obj = Map::new();
    for (column, json_key) in T::columns().iter().zip(T::json_keys()) {
        if let Some(value) = row.get(*column).filter(|v| !v.is_null()) {
            obj.insert((*json_key).to_string(), value.clone());
        }
    }
    serde_json::from_value(JsonValue::Object(obj))
        .map_err(|e| StorageError::StorageError(format!("Deserialization error: {}", e)))
}

/// JSON form of a bound value, matching how rows serialize the same type.
pub(crate) fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Int(n) => JsonValue::from(*n),
        Value::UInt(n) => JsonValue::from(*n),
        Value::Float(n) => JsonValue::from(*n),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Uuid(u) => JsonValue::String(u.to_string()),
        Value::Strings(v) => JsonValue::from(v.clone()),
        Value::Ints(v) => JsonValue::from(v.clone()),
        Value::Uuids(v) => JsonValue::Array(v.iter().map(|u| JsonValue::String(u.to_string())).collect()),
        Value::Datetime(dt) => JsonValue::String(dt.to_string()),
        Value::Null => JsonValue::Null,
    }
}

/// Ordering between two scalar JSON values. `None` when either is null or
/// the kinds differ.
pub(crate) fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equals(a: &JsonValue, b: &JsonValue) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// Column values visible to filters: `column` and `table.column` for the
/// main table, `table.column` for joined tables.
type Scope = HashMap<String, JsonValue>;

fn add_to_scope(scope: &mut Scope, table: &str, row: &Row, unqualified: bool) {
    for (column, value) in row {
        if unqualified {
            scope.insert(column.clone(), value.clone());
        }
        scope.insert(format!("{table}.{column}"), value.clone());
    }
}

fn matches(scope: &Scope, filter: &Filter) -> bool {
    let field = scope.get(filter.field()).unwrap_or(&JsonValue::Null);
    match filter {
        Filter::Eq(_, value) => equals(field, &to_json(value)),
        Filter::Ne(_, value) => {
            let value = to_json(value);
            !field.is_null() && !value.is_null() && !equals(field, &value)
        }
        Filter::Gt(_, value) => compare(field, &to_json(value)) == Some(Ordering::Greater),
        Filter::Gte(_, value) => matches!(
            compare(field, &to_json(value)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lt(_, value) => compare(field, &to_json(value)) == Some(Ordering::Less),
        Filter::Lte(_, value) => matches!(
            compare(field, &to_json(value)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::In(_, value) => match to_json(value) {
            JsonValue::Array(candidates) => candidates.iter().any(|c| equals(field, c)),
            single => equals(field, &single),
        },
        Filter::StartsWith(_, prefix) => field.as_str().is_some_and(|s| s.starts_with(prefix.as_str())),
        Filter::IsNull(_) => field.is_null(),
        Filter::IsNotNull(_) => !field.is_null(),
    }
}

fn order_scopes(scopes: &mut [(Scope, usize)], order_by: &[(String, Order)]) {
    scopes.sort_by(|(a, _), (b, _)| {
        for (field, order) in order_by {
            let x = a.get(field).unwrap_or(&JsonValue::Null);
            let y = b.get(field).unwrap_or(&JsonValue::Null);
            // Nulls sort first
            let ordering = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = match order {
                Order::Asc => ordering,
                Order::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

impl Tables {
    fn table(&self, name: &str) -> &[Row] {
        self.rows.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn next_identity(&mut self, table: &str, column: &str) -> i64 {
        let current = self.sequences.get(table).copied().unwrap_or(0);
        let max_stored = self
            .table(table)
            .iter()
            .filter_map(|row| row.get(column).and_then(JsonValue::as_i64))
            .max()
            .unwrap_or(0);
        let next = current.max(max_stored) + 1;
        self.sequences.insert(table.to_string(), next);
        next
    }

    /// Joined, filtered, ordered and paged scopes with the index of the main row.
    fn select<T>(&self, query: &Query<T>) -> Vec<(Scope, usize)> {
        let mut scopes: Vec<(Scope, usize)> = self
            .table(&query.table)
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let mut scope = Scope::new();
                add_to_scope(&mut scope, &query.table, row, true);
                (scope, idx)
            })
            .collect();

        for join in &query.joins {
            let left = format!("{}.{}", query.table, join.left_field);
            let mut joined = Vec::new();
            for (scope, idx) in scopes {
                let key = scope.get(&left).cloned().unwrap_or(JsonValue::Null);
                for right in self.table(&join.table) {
                    let value = right.get(&join.right_field).unwrap_or(&JsonValue::Null);
                    if equals(&key, value) {
                        let mut combined = scope.clone();
                        add_to_scope(&mut combined, &join.table, right, false);
                        joined.push((combined, idx));
                    }
                }
            }
            scopes = joined;
        }

        scopes.retain(|(scope, _)| query.filters.iter().all(|f| matches(scope, f)));
        order_scopes(&mut scopes, &query.order_by);

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        scopes.into_iter().skip(offset).take(limit).collect()
    }

    pub(crate) fn fetch<T: Storable + DeserializeOwned>(
        &self,
        query: &Query<T>,
    ) -> Result<Vec<T>, StorageError> {
        let rows = self.table(&query.table);
        self.select(query)
            .into_iter()
            .map(|(_, idx)| from_row::<T>(&rows[idx]))
            .collect()
    }

    pub(crate) fn aggregate<T>(
        &self,
        query: &Query<T>,
        aggregate: &Aggregate,
    ) -> Result<Option<i64>, StorageError> {
        let scopes = self.select(query);
        match aggregate {
            Aggregate::Count => Ok(Some(scopes.len() as i64)),
            Aggregate::Max(column) => Ok(scopes
                .iter()
                .filter_map(|(scope, _)| scope.get(column).and_then(JsonValue::as_i64))
                .max()),
        }
    }

    pub(crate) fn delete<T>(&mut self, delete: &Delete<T>) -> u64 {
        let Some(rows) = self.rows.get_mut(&delete.table) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| {
            let mut scope = Scope::new();
            add_to_scope(&mut scope, &delete.table, row, true);
            !delete.filters.iter().all(|f| matches(&scope, f))
        });
        (before - rows.len()) as u64
    }

    /// Insert a row. An identity column left at `0` or null is generated.
    pub(crate) fn insert<T: Storable + Serialize>(&mut self, item: &T) -> Result<i64, StorageError> {
        self.insert_row::<T>(to_row(item)?)
    }

    /// Insert a row, always generating its identity.
    pub(crate) fn insert_generated<T: Storable + Serialize>(
        &mut self,
        item: &T,
    ) -> Result<i64, StorageError> {
        let column = T::identity_column().ok_or_else(|| {
            StorageError::Unsupported(format!("{} has no identity column", T::table_name()))
        })?;
        let mut row = to_row(item)?;
        row.insert(column.to_string(), JsonValue::Null);
        self.insert_row::<T>(row)
    }

    fn insert_row<T: Storable>(&mut self, mut row: Row) -> Result<i64, StorageError> {
        let table = T::table_name();
        let mut id = 0;
        if let Some(column) = T::identity_column() {
            id = row.get(column).and_then(JsonValue::as_i64).unwrap_or(0);
            if id == 0 {
                id = self.next_identity(table, column);
                row.insert(column.to_string(), JsonValue::from(id));
            } else {
                let current = self.sequences.get(table).copied().unwrap_or(0);
                self.sequences.insert(table.to_string(), current.max(id));
            }
        }
        self.rows.entry(table.to_string()).or_default().push(row);
        Ok(id)
    }

    /// Replace every row whose key column matches the item's key.
    pub(crate) fn update<T: Storable + Serialize>(&mut self, item: &T) -> Result<u64, StorageError> {
        let column = T::key_column().ok_or_else(|| {
            StorageError::Unsupported(format!("{} has no key column", T::table_name()))
        })?;
        let row = to_row(item)?;
        let key = item.key_value().map(|v| to_json(&v)).unwrap_or(JsonValue::Null);
        if key.is_null() {
            return Err(StorageError::StorageError(format!(
                "update on {} without a key value",
                T::table_name()
            )));
        }

        let mut updated = 0;
        if let Some(rows) = self.rows.get_mut(T::table_name()) {
            for stored in rows.iter_mut() {
                if stored.get(column).is_some_and(|v| equals(v, &key)) {
                    *stored = row.clone();
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    pub(crate) fn row_count(&self, table: &str) -> usize {
        self.table(table).len()
    }
}
