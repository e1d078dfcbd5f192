//! Row write statements.
//!
//! Values are rendered as literals in the target dialect. The column's
//! canonical type decides how loosely typed driver values are spelled, so a
//! SQLite `1` lands in a PostgreSQL `boolean` column as `TRUE`, and binary
//! values are written as byte literals rather than text.

use std::collections::HashMap;

use dbsync_core::{EngineDialect, Row, RowExt, Table, as_binary};
use serde_json::Value;

/// Renders `INSERT`, `UPDATE` and `DELETE` statements for one table.
pub(crate) struct RowWriter<'a> {
    dialect: &'static dyn EngineDialect,
    qualified: String,
    types: HashMap<&'a str, &'a str>,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(dialect: &'static dyn EngineDialect, qualified: String, table: &'a Table) -> Self {
        let types = table
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        Self {
            dialect,
            qualified,
            types,
        }
    }

    /// One multi-row `INSERT`.
    pub(crate) fn insert(&self, columns: &[String], rows: &[&Row]) -> String {
        let values = rows
            .iter()
            .map(|row| {
                let literals: Vec<String> = columns.iter().map(|c| self.value(row, c)).collect();
                format!("({})", literals.join(", "))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualified,
            self.dialect.quote_list(columns),
            values
        )
    }

    /// `UPDATE` of `set_columns` on the row identified by `key_columns`.
    pub(crate) fn update(&self, row: &Row, key_columns: &[String], set_columns: &[String]) -> String {
        let assignments = set_columns
            .iter()
            .map(|c| format!("{} = {}", self.dialect.quote_ident(c), self.value(row, c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.qualified,
            assignments,
            self.key_predicate(row, key_columns)
        )
    }

    /// One `DELETE` of every row in `rows`, matched by key.
    pub(crate) fn delete(&self, key_columns: &[String], rows: &[&Row]) -> String {
        let predicate = match key_columns {
            [only] => {
                let values: Vec<String> = rows.iter().map(|r| self.value(r, only)).collect();
                format!("{} IN ({})", self.dialect.quote_ident(only), values.join(", "))
            }
            _ => rows
                .iter()
                .map(|r| format!("({})", self.key_predicate(r, key_columns)))
                .collect::<Vec<_>>()
                .join(" OR "),
        };
        format!("DELETE FROM {} WHERE {}", self.qualified, predicate)
    }

    fn key_predicate(&self, row: &Row, key_columns: &[String]) -> String {
        key_columns
            .iter()
            .map(|c| format!("{} = {}", self.dialect.quote_ident(c), self.value(row, c)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn value(&self, row: &Row, column: &str) -> String {
        let value = row.get_ci(column).unwrap_or(&Value::Null);
        render_for_type(self.dialect, value, self.types.get(column).copied())
    }
}

/// Render `value` for a column of canonical type `data_type`.
pub(crate) fn render_for_type(
    dialect: &dyn EngineDialect,
    value: &Value,
    data_type: Option<&str>,
) -> String {
    if let Some(bytes) = as_binary(value) {
        return match data_type {
            Some("binary") | None => dialect.render_binary(&bytes),
            Some(_) => dialect.render_value(&Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
        };
    }
    match (value, data_type) {
        (Value::String(s), Some("binary")) => dialect.render_binary(s.as_bytes()),
        (Value::Number(n), Some("boolean")) => {
            dialect.render_bool(n.as_f64().is_some_and(|f| f != 0.0)).to_string()
        }
        (Value::String(s), Some("boolean")) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" => dialect.render_bool(true).to_string(),
            "0" | "f" | "false" | "n" | "no" => dialect.render_bool(false).to_string(),
            _ => dialect.render_value(value),
        },
        (Value::Bool(b), Some(t)) if t != "boolean" => String::from(if *b { "1" } else { "0" }),
        (Value::Array(_) | Value::Object(_), _) => {
            dialect.render_value(&Value::String(value.to_string()))
        }
        _ => dialect.render_value(value),
    }
}
