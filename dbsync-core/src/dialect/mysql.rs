//! MySQL and MariaDB dialects.
//!
//! The two share one type table; MariaDB differs in tolerating `IF EXISTS`
//! on index and constraint drops.

use super::typemap::{NativeType, TypeMap};
use super::{ColumnAlteration, EngineDialect};
use crate::engine::Engine;

static MYSQL_TYPES: TypeMap = TypeMap {
    exact: &[("tinyint(1)", "boolean"), ("bit(1)", "boolean"), ("char(36)", "uuid")],
    normalize: &[
        ("tinyint", "smallint"),
        ("mediumint", "integer"),
        ("int", "integer"),
        ("float", "real"),
        ("double precision", "double"),
        ("numeric", "decimal"),
        ("bool", "boolean"),
        ("tinytext", "text"),
        ("mediumtext", "text"),
        ("longtext", "text"),
        ("datetime", "timestamp"),
        ("timestamp", "timestamptz"),
        ("varbinary", "binary"),
        ("blob", "binary"),
        ("tinyblob", "binary"),
        ("mediumblob", "binary"),
        ("longblob", "binary"),
    ],
    parameterized: &["varchar", "char", "decimal", "enum", "set"],
    native: &[
        NativeType::plain("smallint", "SMALLINT"),
        NativeType::plain("integer", "INT"),
        NativeType::plain("bigint", "BIGINT"),
        NativeType::plain("real", "FLOAT"),
        NativeType::plain("double", "DOUBLE"),
        NativeType::sized_or("decimal", "DECIMAL", "10,0"),
        NativeType::plain("boolean", "TINYINT(1)"),
        NativeType::sized_or("char", "CHAR", "1"),
        NativeType::sized_or("varchar", "VARCHAR", "255"),
        NativeType::plain("text", "LONGTEXT"),
        NativeType::plain("date", "DATE"),
        NativeType::plain("time", "TIME"),
        NativeType::plain("timestamp", "DATETIME"),
        NativeType::plain("timestamptz", "TIMESTAMP"),
        NativeType::plain("json", "JSON"),
        NativeType::plain("binary", "LONGBLOB"),
        NativeType::plain("uuid", "CHAR(36)"),
    ],
    fallback: "LONGTEXT",
};

fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl EngineDialect for MySqlDialect {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn type_map(&self) -> &'static TypeMap {
        &MYSQL_TYPES
    }

    fn quote_ident(&self, ident: &str) -> String {
        quote_backtick(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\\', "\\\\").replace('\'', "''")
    }

    fn render_bool(&self, b: bool) -> &'static str {
        if b { "1" } else { "0" }
    }

    fn disable_fk_checks(&self) -> Option<&'static str> {
        Some("SET FOREIGN_KEY_CHECKS = 0")
    }

    fn enable_fk_checks(&self) -> Option<&'static str> {
        Some("SET FOREIGN_KEY_CHECKS = 1")
    }

    fn begin_transaction(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn column_alteration(&self) -> ColumnAlteration {
        ColumnAlteration::Redefine
    }

    fn drop_foreign_key(&self, qualified_table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {};",
            qualified_table,
            self.quote_ident(name)
        )
    }

    fn drop_index(&self, schema: Option<&str>, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {};",
            self.quote_ident(name),
            self.qualify(schema, table)
        )
    }

    fn drop_primary_key(&self, qualified_table: &str, _table: &str, _constraint: Option<&str>) -> String {
        format!("ALTER TABLE {qualified_table} DROP PRIMARY KEY;")
    }

    fn auto_increment_attribute(&self) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    fn create_table_suffix(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    }
}

/// MariaDB dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MariaDbDialect;

impl EngineDialect for MariaDbDialect {
    fn engine(&self) -> Engine {
        Engine::MariaDb
    }

    fn type_map(&self) -> &'static TypeMap {
        &MYSQL_TYPES
    }

    fn quote_ident(&self, ident: &str) -> String {
        quote_backtick(ident)
    }

    fn escape_string(&self, s: &str) -> String {
        MySqlDialect.escape_string(s)
    }

    fn render_bool(&self, b: bool) -> &'static str {
        MySqlDialect.render_bool(b)
    }

    fn disable_fk_checks(&self) -> Option<&'static str> {
        MySqlDialect.disable_fk_checks()
    }

    fn enable_fk_checks(&self) -> Option<&'static str> {
        MySqlDialect.enable_fk_checks()
    }

    fn begin_transaction(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn column_alteration(&self) -> ColumnAlteration {
        ColumnAlteration::Redefine
    }

    fn drop_foreign_key(&self, qualified_table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY IF EXISTS {};",
            qualified_table,
            self.quote_ident(name)
        )
    }

    fn drop_index(&self, schema: Option<&str>, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX IF EXISTS {} ON {};",
            self.quote_ident(name),
            self.qualify(schema, table)
        )
    }

    fn drop_primary_key(&self, qualified_table: &str, table: &str, constraint: Option<&str>) -> String {
        MySqlDialect.drop_primary_key(qualified_table, table, constraint)
    }

    fn auto_increment_attribute(&self) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    fn create_table_suffix(&self) -> &'static str {
        MySqlDialect.create_table_suffix()
    }
}
