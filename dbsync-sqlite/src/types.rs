//! Conversion of SQLite values into result rows.
//!
//! Text is returned as stored. Blobs become binary values (see
//! [`dbsync_core::binary_value`]) so they stay distinct from text.

use dbsync_core::binary_value;
use rusqlite::types::ValueRef;
use serde_json::Value;

/// Convert a SQLite value to JSON.
pub fn from_sqlite_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => binary_value(bytes),
    }
}

/// Get a JSON value from a row at the given column index.
pub fn get_value_at_index(row: &rusqlite::Row<'_>, index: usize) -> Value {
    row.get_ref(index)
        .map(from_sqlite_value)
        .unwrap_or(Value::Null)
}
