//! Serde-based binding for PostgreSQL queries.
//!
//! Row types are serialized to JSON and their values bound in column order,
//! so a type only needs `#[derive(Storable)]` to be written or read.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row};
use content_store::{Storable, StorageError};

fn storage_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::StorageError(e.to_string())
}

/// Build INSERT SQL for a table with the given columns.
pub(crate) fn build_insert_sql(table: &str, columns: &[&str], returning: Option<&str>) -> String {
    let cols = columns.join(", ");
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols,
        placeholders.join(", ")
    );
    if let Some(column) = returning {
        sql.push_str(&format!(" RETURNING {}", column));
    }
    sql
}

/// Build UPDATE SQL setting `columns` on the row addressed by `key`.
pub(crate) fn build_update_sql(table: &str, columns: &[&str], key: &str) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", c, i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        table,
        assignments.join(", "),
        key,
        columns.len() + 1
    )
}

fn to_object<T: Storable + Serialize>(item: &T) -> Result<serde_json::Map<String, Value>, StorageError> {
    let json = serde_json::to_value(item)
        .map_err(|e| StorageError::StorageError(format!("Serialization error: {}", e)))?;

    match json {
        Value::Object(obj) => Ok(obj),
        _ => Err(StorageError::StorageError(
            "Expected JSON object for Storable type".to_string(),
        )),
    }
}

/// Bind the values of the selected columns, in the order given.
fn bind_columns<T: Storable>(
    args: &mut PgArguments,
    obj: &serde_json::Map<String, Value>,
    include: impl Fn(&str) -> bool,
) -> Result<Vec<&'static str>, StorageError> {
    let column_types = T::column_types();
    let json_keys = T::json_keys();
    let mut bound = Vec::new();

    for (idx, column) in T::columns().iter().enumerate() {
        if !include(column) {
            continue;
        }
        let json_key = json_keys.get(idx).copied().unwrap_or(*column);
        let value = obj.get(json_key).cloned().unwrap_or(Value::Null);
        let col_type = column_types.get(idx).copied().unwrap_or("text");
        bind_json_value(args, &value, col_type)?;
        bound.push(*column);
    }
    Ok(bound)
}

/// INSERT for every column, identity included.
pub(crate) fn insert_statement<T: Storable + Serialize>(
    item: &T,
) -> Result<(String, PgArguments), StorageError> {
    let obj = to_object(item)?;
    let mut args = PgArguments::default();
    let columns = bind_columns::<T>(&mut args, &obj, |_| true)?;
    Ok((build_insert_sql(T::table_name(), &columns, None), args))
}

/// INSERT leaving the identity column to the database and returning it.
pub(crate) fn insert_returning_statement<T: Storable + Serialize>(
    item: &T,
) -> Result<(String, PgArguments), StorageError> {
    let identity = T::identity_column().ok_or_else(|| {
        StorageError::Unsupported(format!("{} has no identity column", T::table_name()))
    })?;
    let obj = to_object(item)?;
    let mut args = PgArguments::default();
    let columns = bind_columns::<T>(&mut args, &obj, |c| c != identity)?;
    Ok((build_insert_sql(T::table_name(), &columns, Some(identity)), args))
}

/// UPDATE of every non-key column on the row addressed by the key column.
pub(crate) fn update_statement<T: Storable + Serialize>(
    item: &T,
) -> Result<(String, PgArguments), StorageError> {
    let key = T::key_column().ok_or_else(|| {
        StorageError::Unsupported(format!("{} has no key column", T::table_name()))
    })?;
    let obj = to_object(item)?;
    let mut args = PgArguments::default();
    let columns = bind_columns::<T>(&mut args, &obj, |c| c != key && Some(c) != T::identity_column())?;
    bind_columns::<T>(&mut args, &obj, |c| c == key)?;
    Ok((build_update_sql(T::table_name(), &columns, key), args))
}

/// Deserialize a PostgreSQL row to a Storable type.
///
/// Extracts column values from the row using columns() and inserts them
/// into JSON using json_keys() to match serde's field naming.
/// Null values are omitted to match serde's skip_serializing_if behavior.
pub fn deserialize_row<T: Storable + DeserializeOwned>(row: &PgRow) -> Result<T, StorageError> {
    let mut obj = serde_json::Map::new();
    let columns = T::columns();
    let json_keys = T::json_keys();

    for (col_name, json_key) in columns.iter().zip(json_keys.iter()) {
        let value = extract_column_value(row, col_name)?;
        if !value.is_null() {
            obj.insert((*json_key).to_string(), value);
        }
    }

    serde_json::from_value(Value::Object(obj))
        .map_err(|e| StorageError::StorageError(format!("Deserialization error: {}", e)))
}

/// Bind a JSON value to PgArguments
fn bind_json_value(args: &mut PgArguments, value: &Value, col_type: &str) -> Result<(), StorageError> {
    if col_type == "json" {
        // Every value of a json column, null included, is stored as jsonb
        return args
            .add(sqlx::types::Json(value.clone()))
            .map_err(storage_error);
    }

    match value {
        Value::Null => {
            // Use column type to bind the correct null type
            match col_type {
                "datetime" => args.add(None::<chrono::DateTime<chrono::Utc>>),
                "bigint" => args.add(None::<i64>),
                "integer" => args.add(None::<i32>),
                "smallint" => args.add(None::<i16>),
                "boolean" => args.add(None::<bool>),
                "uuid" => args.add(None::<uuid::Uuid>),
                _ => args.add(None::<String>), // text and default
            }
            .map_err(storage_error)?;
        }
        Value::Bool(b) => {
            args.add(*b).map_err(storage_error)?;
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match col_type {
                    "integer" => args.add(i32::try_from(i).map_err(storage_error)?),
                    "smallint" => args.add(i16::try_from(i).map_err(storage_error)?),
                    _ => args.add(i),
                }
                .map_err(storage_error)?;
            } else if let Some(u) = n.as_u64() {
                // PostgreSQL doesn't have unsigned, use i64
                args.add(i64::try_from(u).map_err(storage_error)?)
                    .map_err(storage_error)?;
            } else if let Some(f) = n.as_f64() {
                args.add(f).map_err(storage_error)?;
            } else {
                // Fallback: store as string
                args.add(n.to_string()).map_err(storage_error)?;
            }
        }
        Value::String(s) => match col_type {
            "datetime" => {
                let dt = chrono::DateTime::parse_from_rfc3339(s)
                    .map_err(|e| StorageError::StorageError(format!("Invalid datetime: {}", e)))?;
                args.add(dt.with_timezone(&chrono::Utc))
                    .map_err(storage_error)?;
            }
            "uuid" => {
                let id = uuid::Uuid::parse_str(s)
                    .map_err(|e| StorageError::StorageError(format!("Invalid uuid: {}", e)))?;
                args.add(id).map_err(storage_error)?;
            }
            _ => {
                args.add(s.as_str()).map_err(storage_error)?;
            }
        },
        Value::Array(_) | Value::Object(_) => {
            args.add(sqlx::types::Json(value.clone()))
                .map_err(storage_error)?;
        }
    }

    Ok(())
}

/// Extract a column value from a row as JSON
fn extract_column_value(row: &PgRow, col_name: &str) -> Result<Value, StorageError> {
    use sqlx::TypeInfo;

    let col_idx = row
        .columns()
        .iter()
        .position(|c| c.name() == col_name)
        .ok_or_else(|| StorageError::StorageError(format!("Column not found: {}", col_name)))?;

    let type_name = row.columns()[col_idx].type_info().name();

    let value = match type_name {
        "BOOL" => {
            let v: Option<bool> = row.try_get(col_idx).map_err(storage_error)?;
            v.map(Value::Bool).unwrap_or(Value::Null)
        }
        "INT2" | "SMALLINT" => {
            let v: Option<i16> = row.try_get(col_idx).map_err(storage_error)?;
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        }
        "INT4" | "INTEGER" => {
            let v: Option<i32> = row.try_get(col_idx).map_err(storage_error)?;
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        }
        "INT8" | "BIGINT" => {
            let v: Option<i64> = row.try_get(col_idx).map_err(storage_error)?;
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        }
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE PRECISION" => {
            let v: Option<f64> = row.try_get(col_idx).map_err(storage_error)?;
            v.and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                .unwrap_or(Value::Null)
        }
        "TIMESTAMPTZ" | "TIMESTAMP" => {
            let v: Option<chrono::DateTime<chrono::Utc>> =
                row.try_get(col_idx).map_err(storage_error)?;
            // Use microsecond precision with Z to match StorageDatetime's serde format
            v.map(|dt| Value::String(dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)))
                .unwrap_or(Value::Null)
        }
        "UUID" => {
            let v: Option<uuid::Uuid> = row.try_get(col_idx).map_err(storage_error)?;
            v.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null)
        }
        "JSONB" | "JSON" => {
            let v: Option<Value> = row.try_get(col_idx).map_err(storage_error)?;
            v.unwrap_or(Value::Null)
        }
        _ => {
            // Default: treat as string (VARCHAR, TEXT, CHAR, etc.)
            let v: Option<String> = row.try_get(col_idx).map_err(storage_error)?;
            v.map(Value::String).unwrap_or(Value::Null)
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_lists_columns_and_returning() {
        let sql = build_insert_sql("content_node", &["parent_id", "path"], Some("id"));
        assert_eq!(
            sql,
            "INSERT INTO content_node (parent_id, path) VALUES ($1, $2) RETURNING id"
        );
    }

    #[test]
    fn update_sql_binds_key_last() {
        let sql = build_update_sql("content_document", &["published", "newest"], "version_id");
        assert_eq!(
            sql,
            "UPDATE content_document SET published = $1, newest = $2 WHERE version_id = $3"
        );
    }
}
