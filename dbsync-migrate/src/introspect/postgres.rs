//! PostgreSQL catalog reader.

use async_trait::async_trait;
use dbsync_core::{Column, ConnectionHandle, ForeignKey, Index, Row, RowExt, SyncResult};

use super::{CatalogReader, group_foreign_keys, literal, normalize_default};

/// Reads `information_schema` and `pg_catalog`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCatalog;

#[async_trait]
impl CatalogReader for PostgresCatalog {
    async fn list_schemas(&self, conn: &ConnectionHandle) -> SyncResult<Vec<String>> {
        let result = conn
            .query(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema') \
                 AND schema_name NOT LIKE 'pg_toast%' AND schema_name NOT LIKE 'pg_temp%' \
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
            "SELECT table_name FROM information_schema.tables \
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
            "SELECT column_name, data_type, udt_name, character_maximum_length, \
             numeric_precision, numeric_scale, is_nullable, column_default, \
             ordinal_position, is_identity \
             FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} ORDER BY ordinal_position",
            literal(conn, schema),
            literal(conn, table)
        );
        let result = conn.query(&sql).await?;
        let dialect = conn.dialect();

        Ok(result
            .rows
            .iter()
            .map(|row| {
                let native = native_type(row);
                let data_type = dialect.normalize_type(&native);
                let raw_default = row.str_value("column_default");
                let is_serial = raw_default
                    .as_deref()
                    .is_some_and(|d| d.starts_with("nextval("));
                let mut column = Column::new(row.str_value("column_name").unwrap_or_default(), "");
                column.default_value = if is_serial {
                    None
                } else {
                    normalize_default(raw_default.as_deref(), &data_type)
                };
                column.data_type = data_type;
                column.native_type = native;
                column.nullable = row.bool_value("is_nullable");
                column.is_auto_increment = is_serial || row.bool_value("is_identity");
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
            "SELECT i.relname AS index_name, ix.indisunique AS is_unique, \
             ix.indisprimary AS is_primary, am.amname AS index_method, \
             string_agg(a.attname, ',' ORDER BY k.ord) AS columns \
             FROM pg_index ix \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_am am ON am.oid = i.relam \
             CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = {} AND t.relname = {} \
             GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname \
             ORDER BY i.relname",
            literal(conn, schema),
            literal(conn, table)
        );
        let result = conn.query(&sql).await?;

        Ok(result
            .rows
            .iter()
            .map(|row| {
                let columns = row
                    .str_value("columns")
                    .map(|c| c.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                let mut index = Index::new(row.str_value("index_name").unwrap_or_default(), columns);
                index.is_unique = row.bool_value("is_unique");
                index.is_primary = row.bool_value("is_primary");
                if let Some(method) = row.str_value("index_method") {
                    index.index_type = method;
                }
                index
            })
            .collect())
    }

    async fn read_foreign_keys(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<ForeignKey>> {
        let sql = format!(
            "SELECT c.conname AS constraint_name, a.attname AS column_name, \
             rn.nspname AS referenced_schema, rt.relname AS referenced_table, \
             ra.attname AS referenced_column, c.confdeltype AS delete_rule, \
             c.confupdtype AS update_rule, k.ord AS position \
             FROM pg_constraint c \
             JOIN pg_class t ON t.oid = c.conrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_class rt ON rt.oid = c.confrelid \
             JOIN pg_namespace rn ON rn.oid = rt.relnamespace \
             CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, refnum, ord) \
             JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum \
             JOIN pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = k.refnum \
             WHERE c.contype = 'f' AND n.nspname = {} AND t.relname = {} \
             ORDER BY c.conname, k.ord",
            literal(conn, schema),
            literal(conn, table)
        );
        let result = conn.query(&sql).await?;
        group_foreign_keys(&result.rows, schema)
    }
}

/// Rebuild the DDL-significant type from `information_schema.columns`.
fn native_type(row: &Row) -> String {
    let data_type = row.str_value("data_type").unwrap_or_default();
    let udt = row.str_value("udt_name").unwrap_or_default();
    match data_type.as_str() {
        "USER-DEFINED" => udt,
        "ARRAY" => format!("{}[]", udt.trim_start_matches('_')),
        "character varying" | "character" | "bit" | "bit varying" => {
            match row.i64_value("character_maximum_length") {
                Some(len) => format!("{data_type}({len})"),
                None => data_type,
            }
        }
        "numeric" => match (row.i64_value("numeric_precision"), row.i64_value("numeric_scale")) {
            (Some(p), Some(s)) => format!("numeric({p},{s})"),
            (Some(p), None) => format!("numeric({p})"),
            _ => data_type,
        },
        _ => data_type,
    }
}
