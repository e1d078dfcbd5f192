//! SQL dialects.
//!
//! [`EngineDialect`] is the single place where engine differences live:
//! identifier quoting, literal rendering, type vocabulary and maintenance
//! commands. Call sites obtain a dialect through [`Engine::dialect`] and never
//! branch on the engine themselves.
//!
//! [`Engine::dialect`]: crate::engine::Engine::dialect

mod mysql;
mod postgres;
mod sqlite;
pub mod typemap;

pub use mysql::{MariaDbDialect, MySqlDialect};
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use typemap::{NativeType, TypeMap};

use serde_json::Value;

use crate::engine::Engine;
use crate::model::ForeignKey;
use crate::value::as_binary;

/// How a dialect changes an existing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAlteration {
    /// One `ALTER COLUMN` clause per changed attribute.
    PerAttribute,
    /// Restate the whole definition (`MODIFY COLUMN`).
    Redefine,
    /// Columns cannot be altered; the table is rebuilt.
    Rebuild,
}

/// Engine-specific SQL capability.
pub trait EngineDialect: Send + Sync + std::fmt::Debug {
    /// Engine this dialect writes for.
    fn engine(&self) -> Engine;

    /// Type vocabulary for this dialect.
    fn type_map(&self) -> &'static TypeMap;

    /// Quote an identifier.
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote an identifier, optionally prefixed by a schema.
    fn qualify(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(name)),
            None => self.quote_ident(name),
        }
    }

    /// Normalize a native type string into the shared vocabulary.
    fn normalize_type(&self, native: &str) -> String {
        self.type_map().normalize(native)
    }

    /// Spell a canonical type in this dialect.
    fn map_type(&self, canonical: &str) -> String {
        self.type_map().to_native(canonical)
    }

    /// Escape the body of a string literal.
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    /// Boolean literal.
    fn render_bool(&self, b: bool) -> &'static str {
        if b { "TRUE" } else { "FALSE" }
    }

    /// Binary literal.
    fn render_binary(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex::encode(bytes))
    }

    /// Render a JSON value as a SQL literal.
    fn render_value(&self, value: &Value) -> String {
        if let Some(bytes) = as_binary(value) {
            return self.render_binary(&bytes);
        }
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.render_bool(*b).to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", self.escape_string(s)),
            other => format!("'{}'", self.escape_string(&other.to_string())),
        }
    }

    /// Statement removing every row of a table.
    fn truncate_table(&self, qualified_table: &str) -> String {
        format!("TRUNCATE TABLE {qualified_table}")
    }

    /// Statements emptying a set of tables, given children first. One
    /// statement per table unless the engine truncates a set at once.
    fn truncate_tables(&self, qualified_tables: &[String]) -> Vec<String> {
        qualified_tables
            .iter()
            .map(|t| self.truncate_table(t))
            .collect()
    }

    /// Session statement disabling FK enforcement, when supported.
    fn disable_fk_checks(&self) -> Option<&'static str> {
        None
    }

    /// Session statement restoring FK enforcement.
    fn enable_fk_checks(&self) -> Option<&'static str> {
        None
    }

    /// Whether DDL participates in transactions.
    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    /// How column changes are expressed.
    fn column_alteration(&self) -> ColumnAlteration {
        ColumnAlteration::PerAttribute
    }

    /// Whether columns can be altered in place.
    fn supports_alter_column(&self) -> bool {
        self.column_alteration() != ColumnAlteration::Rebuild
    }

    /// Whether FKs can be added to or dropped from an existing table.
    fn supports_alter_foreign_keys(&self) -> bool {
        true
    }

    /// Start a transaction.
    fn begin_transaction(&self) -> &'static str {
        "BEGIN"
    }

    /// Commit a transaction.
    fn commit_transaction(&self) -> &'static str {
        "COMMIT"
    }

    /// Roll back a transaction.
    fn rollback_transaction(&self) -> &'static str {
        "ROLLBACK"
    }

    /// Paging clause.
    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {limit} OFFSET {offset}")
    }

    /// Row count query aliased as `row_count`.
    fn count_rows(&self, qualified_table: &str) -> String {
        format!("SELECT COUNT(*) AS row_count FROM {qualified_table}")
    }

    /// Drop a foreign key constraint.
    fn drop_foreign_key(&self, qualified_table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            qualified_table,
            self.quote_ident(name)
        )
    }

    /// `CONSTRAINT .. FOREIGN KEY .. REFERENCES ..` clause; `referenced` is
    /// the already quoted parent table.
    fn foreign_key_clause(&self, fk: &ForeignKey, referenced: &str) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_ident(&fk.name),
            self.quote_list(&fk.columns),
            referenced,
            self.quote_list(&fk.referenced_columns),
            fk.on_delete,
            fk.on_update
        )
    }

    /// Add a foreign key to an existing table.
    fn add_foreign_key(&self, qualified_table: &str, fk: &ForeignKey, referenced: &str) -> String {
        format!(
            "ALTER TABLE {} ADD {};",
            qualified_table,
            self.foreign_key_clause(fk, referenced)
        )
    }

    /// Drop an index.
    fn drop_index(&self, schema: Option<&str>, _table: &str, name: &str) -> String {
        format!("DROP INDEX IF EXISTS {};", self.qualify(schema, name))
    }

    /// Create an index. `method` is honoured where the engine supports it.
    fn create_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        columns: &[String],
        unique: bool,
        method: Option<&str>,
    ) -> String {
        let _ = method;
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            if unique { "UNIQUE " } else { "" },
            self.quote_ident(name),
            self.qualify(schema, table),
            self.quote_list(columns)
        )
    }

    /// Change a column's type in place.
    fn alter_column_type(&self, qualified_table: &str, column: &str, native: &str) -> String {
        let column = self.quote_ident(column);
        format!("ALTER TABLE {qualified_table} ALTER COLUMN {column} TYPE {native};")
    }

    /// Quote and join identifiers.
    fn quote_list(&self, idents: &[String]) -> String {
        idents
            .iter()
            .map(|i| self.quote_ident(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Drop the primary key of a table.
    fn drop_primary_key(&self, qualified_table: &str, table: &str, constraint: Option<&str>) -> String {
        let name = constraint
            .map(str::to_string)
            .unwrap_or_else(|| format!("{table}_pkey"));
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            qualified_table,
            self.quote_ident(&name)
        )
    }

    /// Column type for an auto-increment column, when the engine spells it
    /// as a type rather than an attribute.
    fn auto_increment_type(&self, canonical: &str) -> Option<String> {
        let _ = canonical;
        None
    }

    /// Attribute appended to an auto-increment column definition.
    fn auto_increment_attribute(&self) -> Option<&'static str> {
        None
    }

    /// Whether the auto-increment attribute is only valid on an inline
    /// single-column `INTEGER PRIMARY KEY`.
    fn auto_increment_requires_inline_key(&self) -> bool {
        false
    }

    /// Suffix appended to `CREATE TABLE (...)`.
    fn create_table_suffix(&self) -> &'static str {
        ""
    }
}
