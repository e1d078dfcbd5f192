//! PostgreSQL dialect.

use super::typemap::{NativeType, TypeMap};
use super::EngineDialect;
use crate::engine::Engine;

static POSTGRES_TYPES: TypeMap = TypeMap {
    exact: &[],
    normalize: &[
        ("int2", "smallint"),
        ("smallserial", "smallint"),
        ("int", "integer"),
        ("int4", "integer"),
        ("serial", "integer"),
        ("serial4", "integer"),
        ("int8", "bigint"),
        ("bigserial", "bigint"),
        ("serial8", "bigint"),
        ("float4", "real"),
        ("float8", "double"),
        ("double precision", "double"),
        ("numeric", "decimal"),
        ("money", "decimal"),
        ("bool", "boolean"),
        ("bpchar", "char"),
        ("character", "char"),
        ("character varying", "varchar"),
        ("citext", "text"),
        ("time without time zone", "time"),
        ("timetz", "time"),
        ("time with time zone", "time"),
        ("timestamp without time zone", "timestamp"),
        ("timestamp with time zone", "timestamptz"),
        ("jsonb", "json"),
        ("bytea", "binary"),
    ],
    parameterized: &["varchar", "char", "decimal"],
    native: &[
        NativeType::plain("smallint", "SMALLINT"),
        NativeType::plain("integer", "INTEGER"),
        NativeType::plain("bigint", "BIGINT"),
        NativeType::plain("real", "REAL"),
        NativeType::plain("double", "DOUBLE PRECISION"),
        NativeType::sized("decimal", "NUMERIC"),
        NativeType::plain("boolean", "BOOLEAN"),
        NativeType::sized_or("char", "CHAR", "1"),
        NativeType::sized("varchar", "VARCHAR"),
        NativeType::plain("text", "TEXT"),
        NativeType::plain("date", "DATE"),
        NativeType::plain("time", "TIME"),
        NativeType::plain("timestamp", "TIMESTAMP"),
        NativeType::plain("timestamptz", "TIMESTAMPTZ"),
        NativeType::plain("json", "JSONB"),
        NativeType::plain("binary", "BYTEA"),
        NativeType::plain("uuid", "UUID"),
    ],
    fallback: "TEXT",
};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl EngineDialect for PostgresDialect {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn type_map(&self) -> &'static TypeMap {
        &POSTGRES_TYPES
    }

    fn render_binary(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'::bytea", hex::encode(bytes))
    }

    /// Never cascades: tables outside the set must keep their rows.
    fn truncate_table(&self, qualified_table: &str) -> String {
        format!("TRUNCATE TABLE {qualified_table}")
    }

    /// Tables referencing each other can only be emptied together.
    fn truncate_tables(&self, qualified_tables: &[String]) -> Vec<String> {
        if qualified_tables.is_empty() {
            return Vec::new();
        }
        vec![format!("TRUNCATE TABLE {}", qualified_tables.join(", "))]
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn create_index(
        &self,
        schema: Option<&str>,
        table: &str,
        name: &str,
        columns: &[String],
        unique: bool,
        method: Option<&str>,
    ) -> String {
        let using = method
            .filter(|m| !m.eq_ignore_ascii_case("btree"))
            .map(|m| format!(" USING {m}"))
            .unwrap_or_default();
        format!(
            "CREATE {}INDEX {} ON {}{} ({});",
            if unique { "UNIQUE " } else { "" },
            self.quote_ident(name),
            self.qualify(schema, table),
            using,
            self.quote_list(columns)
        )
    }

    fn alter_column_type(&self, qualified_table: &str, column: &str, native: &str) -> String {
        let column = self.quote_ident(column);
        format!("ALTER TABLE {qualified_table} ALTER COLUMN {column} TYPE {native} USING {column}::{native};")
    }

    fn auto_increment_type(&self, canonical: &str) -> Option<String> {
        match canonical {
            "smallint" => Some("SMALLSERIAL".to_string()),
            "bigint" => Some("BIGSERIAL".to_string()),
            _ => Some("SERIAL".to_string()),
        }
    }
}
