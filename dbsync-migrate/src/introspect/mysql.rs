//! MySQL / MariaDB catalog reader.
//!
//! Every selected column is aliased in lower case; MySQL 8 otherwise returns
//! `information_schema` columns upper-cased.

use async_trait::async_trait;
use dbsync_core::{Column, ConnectionHandle, Engine, ForeignKey, Index, Row, RowExt, SyncResult};
use indexmap::IndexMap;

use super::{CatalogReader, group_foreign_keys, literal, normalize_default};

/// Reads `information_schema` on MySQL and MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlCatalog;

#[async_trait]
impl CatalogReader for MySqlCatalog {
    async fn list_schemas(&self, conn: &ConnectionHandle) -> SyncResult<Vec<String>> {
        let result = conn
            .query(
                "SELECT schema_name AS schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys') \
                 ORDER BY schema_name",
            )
            .await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|r| r.str_value("schema_name"))
            .collect())
    }

    async fn list_tables(&self, conn: &ConnectionHandle, schema: &str) -> SyncResult<Vec<String>> {
        let sql = format!(
            "SELECT table_name AS table_name FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' ORDER BY table_name",
            literal(conn, schema)
        );
        let result = conn.query(&sql).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|r| r.str_value("table_name"))
            .collect())
    }

    async fn read_columns(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<Column>> {
        let sql = format!(
            "SELECT column_name AS column_name, column_type AS column_type, \
             data_type AS data_type, is_nullable AS is_nullable, \
             column_default AS column_default, extra AS extra, \
             ordinal_position AS ordinal_position \
             FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
            literal(conn, schema),
            literal(conn, table)
        );
        let result = conn.query(&sql).await?;
        let dialect = conn.dialect();
        let engine = conn.engine();

        Ok(result
            .rows
            .iter()
            .map(|row| {
                let native = row.str_value("column_type").unwrap_or_default();
                let data_type = dialect.normalize_type(&native);
                let extra = row
                    .str_value("extra")
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let raw_default = row
                    .str_value("column_default")
                    .map(|d| quote_bare_default(engine, &d, &extra, &data_type));

                let mut column = Column::new(row.str_value("column_name").unwrap_or_default(), "");
                column.default_value = normalize_default(raw_default.as_deref(), &data_type);
                column.data_type = data_type;
                column.native_type = native;
                column.nullable = row.bool_value("is_nullable");
                column.is_auto_increment = extra.contains("auto_increment");
                column.ordinal_position = row.i64_value("ordinal_position").unwrap_or(0) as u32;
                column
            })
            .collect())
    }

    async fn read_indexes(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<Index>> {
        let sql = format!(
            "SELECT index_name AS index_name, column_name AS column_name, \
             non_unique AS non_unique, seq_in_index AS seq_in_index, index_type AS index_type \
             FROM information_schema.statistics \
             WHERE table_schema = {} AND table_name = {} \
             ORDER BY index_name, seq_in_index",
            literal(conn, schema),
            literal(conn, table)
        );
        let result = conn.query(&sql).await?;
        Ok(group_indexes(&result.rows))
    }

    async fn read_foreign_keys(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<ForeignKey>> {
        let sql = format!(
            "SELECT k.constraint_name AS constraint_name, k.column_name AS column_name, \
             k.referenced_table_schema AS referenced_schema, \
             k.referenced_table_name AS referenced_table, \
             k.referenced_column_name AS referenced_column, \
             r.delete_rule AS delete_rule, r.update_rule AS update_rule, \
             k.ordinal_position AS position \
             FROM information_schema.key_column_usage k \
             JOIN information_schema.referential_constraints r \
               ON r.constraint_schema = k.constraint_schema \
              AND r.constraint_name = k.constraint_name \
              AND r.table_name = k.table_name \
             WHERE k.table_schema = {} AND k.table_name = {} \
               AND k.referenced_table_name IS NOT NULL \
             ORDER BY k.constraint_name, k.ordinal_position",
            literal(conn, schema),
            literal(conn, table)
        );
        let result = conn.query(&sql).await?;
        group_foreign_keys(&result.rows, schema)
    }
}

/// MySQL 8 reports literal text defaults without quotes; MariaDB quotes
/// them. Quote bare text so both read the same.
fn quote_bare_default(engine: Engine, raw: &str, extra: &str, data_type: &str) -> String {
    let trimmed = raw.trim();
    let already_literal = trimmed.starts_with('\'')
        || trimmed.parse::<f64>().is_ok()
        || trimmed.eq_ignore_ascii_case("null");
    let is_expression = extra.contains("default_generated")
        || trimmed.to_ascii_uppercase().starts_with("CURRENT_")
        || trimmed.ends_with(')');
    let numeric_type = matches!(
        data_type.split('(').next().unwrap_or_default(),
        "smallint" | "integer" | "bigint" | "real" | "double" | "decimal" | "boolean"
    );

    if engine == Engine::MariaDb || already_literal || is_expression || numeric_type {
        trimmed.to_string()
    } else {
        format!("'{}'", trimmed.replace('\'', "''"))
    }
}

fn group_indexes(rows: &[Row]) -> Vec<Index> {
    let mut grouped: IndexMap<String, Index> = IndexMap::new();
    for row in rows {
        let name = row.str_value("index_name").unwrap_or_default();
        let column = row.str_value("column_name").unwrap_or_default();
        let index = grouped.entry(name.clone()).or_insert_with(|| {
            let mut index = Index::new(name.clone(), Vec::new());
            index.is_primary = name == "PRIMARY";
            index.is_unique = row.i64_value("non_unique") == Some(0);
            if let Some(kind) = row.str_value("index_type") {
                index.index_type = kind.to_ascii_lowercase();
            }
            index
        });
        index.columns.push(column);
    }
    grouped.into_values().collect()
}
