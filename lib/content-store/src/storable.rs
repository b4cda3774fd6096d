//! Storable trait for database-agnostic storage operations.
//!
//! Types implementing `Storable` can be stored in any supported backend.
//! Add `#[derive(Storable)]` with `#[storable(table = "table_name")]` to a
//! row struct to generate the implementation.

use crate::Value;

/// Trait for row types that map onto a single table.
///
/// # Example
///
/// ```text
/// #[derive(Clone, Serialize, Deserialize, Storable)]
/// #[storable(table = "content_document")]
/// #[serde(rename_all = "camelCase")]  // JSON keys - DB uses snake_case
/// pub struct DocumentRow {
///     pub node_id: i64,
///     #[key]
///     pub version_id: Uuid,
///     pub published: bool,
///     pub newest: bool,
///     // ...
/// }
/// ```
///
/// # Column Naming
///
/// Database columns use snake_case (Rust field names). JSON serialization
/// uses whatever serde is configured for (camelCase for the content rows).
///
/// Use `#[column(skip)]` to exclude a field from database storage.
/// Use `#[column(name = "custom_name")]` to override the column name.
pub trait Storable: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync {
    /// The database table name for this type.
    fn table_name() -> &'static str;

    /// Column names in order (snake_case for DB).
    fn columns() -> &'static [&'static str];

    /// Column types in order (database-agnostic).
    /// Used by executors to bind null values with the correct type.
    /// Values: "text", "datetime", "bigint", "integer", "smallint", "boolean", "uuid", "json"
    fn column_types() -> &'static [&'static str];

    /// JSON key names in order (camelCase for serde).
    /// Corresponds 1:1 with columns().
    fn json_keys() -> &'static [&'static str];

    /// INSERT SQL with positional placeholders ($1, $2, ...), identity column excluded.
    fn insert_sql() -> &'static str;

    /// Number of columns.
    fn column_count() -> usize {
        Self::columns().len()
    }

    /// Column whose value the database generates on insert.
    fn identity_column() -> Option<&'static str>;

    /// Column used to address a single row on update.
    /// Falls back to the identity column.
    fn key_column() -> Option<&'static str>;

    /// Value of the key column for this row.
    fn key_value(&self) -> Option<Value>;

    /// Write a generated identity back onto the row. No-op without identity.
    fn set_identity(&mut self, id: i64);
}
