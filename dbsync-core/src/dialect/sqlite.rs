//! SQLite dialect.
//!
//! SQLite accepts arbitrary declared type names and derives storage affinity
//! from them, so canonical types are written back under their own names.
//! This keeps introspection stable across a migrate-then-compare cycle.

use super::typemap::{NativeType, TypeMap};
use super::{ColumnAlteration, EngineDialect};
use crate::engine::Engine;

static SQLITE_TYPES: TypeMap = TypeMap {
    exact: &[("", "binary")],
    normalize: &[
        ("int", "integer"),
        ("tinyint", "smallint"),
        ("mediumint", "integer"),
        ("int2", "smallint"),
        ("int8", "bigint"),
        ("unsigned big int", "bigint"),
        ("float", "real"),
        ("double precision", "double"),
        ("numeric", "decimal"),
        ("bool", "boolean"),
        ("character", "char"),
        ("nchar", "char"),
        ("native character", "char"),
        ("character varying", "varchar"),
        ("varying character", "varchar"),
        ("nvarchar", "varchar"),
        ("clob", "text"),
        ("datetime", "timestamp"),
        ("blob", "binary"),
    ],
    parameterized: &["varchar", "char", "decimal"],
    native: &[
        NativeType::plain("smallint", "SMALLINT"),
        NativeType::plain("integer", "INTEGER"),
        NativeType::plain("bigint", "BIGINT"),
        NativeType::plain("real", "REAL"),
        NativeType::plain("double", "DOUBLE"),
        NativeType::sized("decimal", "DECIMAL"),
        NativeType::plain("boolean", "BOOLEAN"),
        NativeType::sized("char", "CHAR"),
        NativeType::sized("varchar", "VARCHAR"),
        NativeType::plain("text", "TEXT"),
        NativeType::plain("date", "DATE"),
        NativeType::plain("time", "TIME"),
        NativeType::plain("timestamp", "TIMESTAMP"),
        NativeType::plain("timestamptz", "TIMESTAMPTZ"),
        NativeType::plain("json", "JSON"),
        NativeType::plain("binary", "BLOB"),
        NativeType::plain("uuid", "UUID"),
    ],
    fallback: "TEXT",
};

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl EngineDialect for SqliteDialect {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn type_map(&self) -> &'static TypeMap {
        &SQLITE_TYPES
    }

    fn render_bool(&self, b: bool) -> &'static str {
        if b { "1" } else { "0" }
    }

    fn truncate_table(&self, qualified_table: &str) -> String {
        format!("DELETE FROM {qualified_table}")
    }

    fn disable_fk_checks(&self) -> Option<&'static str> {
        Some("PRAGMA foreign_keys = OFF")
    }

    fn enable_fk_checks(&self) -> Option<&'static str> {
        Some("PRAGMA foreign_keys = ON")
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn column_alteration(&self) -> ColumnAlteration {
        ColumnAlteration::Rebuild
    }

    fn create_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        columns: &[String],
        unique: bool,
        _method: Option<&str>,
    ) -> String {
        // The schema prefix goes on the index; the table must be bare.
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            if unique { "UNIQUE " } else { "" },
            self.qualify(schema, name),
            self.quote_ident(table),
            self.quote_list(columns)
        )
    }

    fn supports_alter_foreign_keys(&self) -> bool {
        false
    }

    fn auto_increment_attribute(&self) -> Option<&'static str> {
        Some("AUTOINCREMENT")
    }

    fn auto_increment_requires_inline_key(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_types_survive() {
        let d = SqliteDialect;
        for canonical in ["bigint", "varchar(80)", "boolean", "timestamp", "decimal(10,2)", "uuid"] {
            assert_eq!(d.normalize_type(&d.map_type(canonical)), canonical);
        }
        assert_eq!(d.normalize_type(""), "binary");
        assert_eq!(d.normalize_type("DATETIME"), "timestamp");
    }

    #[test]
    fn test_truncate_is_delete() {
        assert_eq!(SqliteDialect.truncate_table("\"t\""), "DELETE FROM \"t\"");
        let tables = vec!["\"b\"".to_string(), "\"a\"".to_string()];
        assert_eq!(
            SqliteDialect.truncate_tables(&tables),
            vec!["DELETE FROM \"b\"".to_string(), "DELETE FROM \"a\"".to_string()]
        );
    }
}
