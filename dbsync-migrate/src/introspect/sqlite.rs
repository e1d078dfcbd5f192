//! SQLite catalog reader.
//!
//! SQLite has no `information_schema`; tables come from `sqlite_master` and
//! everything else from `PRAGMA` table functions. Foreign keys are unnamed in
//! the catalog, so they get the `{table}_{columns}_fkey` name PostgreSQL
//! would have generated.

use async_trait::async_trait;
use dbsync_core::{
    Column, ConnectionHandle, EngineDialect, ForeignKey, Index, ReferentialAction, Row, RowExt,
    SyncResult,
};
use indexmap::IndexMap;

use super::{CatalogReader, literal, normalize_default};

/// Reads `sqlite_master` and `PRAGMA` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCatalog;

fn pragma(dialect: &dyn EngineDialect, schema: &str, name: &str, arg: &str) -> String {
    format!(
        "PRAGMA {}.{}({})",
        dialect.quote_ident(schema),
        name,
        dialect.quote_ident(arg)
    )
}

/// Primary key columns from `table_info` rows, in key order.
fn primary_key_columns(rows: &[Row]) -> Vec<String> {
    let mut pk: Vec<(i64, String)> = rows
        .iter()
        .filter_map(|r| {
            let position = r.i64_value("pk").unwrap_or(0);
            (position > 0).then(|| (position, r.str_value("name").unwrap_or_default()))
        })
        .collect();
    pk.sort();
    pk.into_iter().map(|(_, name)| name).collect()
}

/// Columns of an index in key order.
async fn index_columns(conn: &ConnectionHandle, schema: &str, index: &str) -> SyncResult<Vec<String>> {
    let result = conn
        .query(&pragma(conn.dialect(), schema, "index_info", index))
        .await?;
    let mut columns: Vec<(i64, String)> = result
        .rows
        .iter()
        .map(|r| (r.i64_value("seqno").unwrap_or(0), r.str_value("name").unwrap_or_default()))
        .collect();
    columns.sort();
    Ok(columns.into_iter().map(|(_, c)| c).collect())
}

#[async_trait]
impl CatalogReader for SqliteCatalog {
    async fn list_schemas(&self, conn: &ConnectionHandle) -> SyncResult<Vec<String>> {
        let result = conn.query("PRAGMA database_list").await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|r| r.str_value("name"))
            .filter(|n| n != "temp")
            .collect())
    }

    async fn list_tables(&self, conn: &ConnectionHandle, schema: &str) -> SyncResult<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            conn.dialect().quote_ident(schema)
        );
        let result = conn.query(&sql).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|r| r.str_value("name"))
            .collect())
    }

    async fn read_columns(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<Column>> {
        let dialect = conn.dialect();
        let info = conn.query(&pragma(dialect, schema, "table_info", table)).await?;
        let ddl = conn
            .query(&format!(
                "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = {}",
                dialect.quote_ident(schema),
                literal(conn, table)
            ))
            .await?
            .rows
            .first()
            .and_then(|r| r.str_value("sql"))
            .unwrap_or_default()
            .to_ascii_uppercase();

        let mut unique_columns = Vec::new();
        let list = conn.query(&pragma(dialect, schema, "index_list", table)).await?;
        for row in list.rows.iter().filter(|r| {
            r.str_value("origin").as_deref() == Some("u") && r.bool_value("unique")
        }) {
            let name = row.str_value("name").unwrap_or_default();
            if let [only] = index_columns(conn, schema, &name).await?.as_slice() {
                unique_columns.push(only.clone());
            }
        }

        let pk_count = info
            .rows
            .iter()
            .filter(|r| r.i64_value("pk").unwrap_or(0) > 0)
            .count();

        Ok(info
            .rows
            .iter()
            .map(|row| {
                let native = row.str_value("type").unwrap_or_default();
                let data_type = dialect.normalize_type(&native);
                let in_pk = row.i64_value("pk").unwrap_or(0) > 0;

                let mut column = Column::new(row.str_value("name").unwrap_or_default(), "");
                column.default_value =
                    normalize_default(row.str_value("dflt_value").as_deref(), &data_type);
                // Only an INTEGER PRIMARY KEY aliases the rowid.
                column.is_auto_increment = in_pk
                    && pk_count == 1
                    && native.eq_ignore_ascii_case("integer")
                    && ddl.contains("AUTOINCREMENT");
                column.nullable = !row.bool_value("notnull") && !in_pk;
                column.is_primary_key = in_pk;
                column.is_unique = unique_columns.contains(&column.name);
                column.ordinal_position = row.i64_value("cid").unwrap_or(0) as u32 + 1;
                column.data_type = data_type;
                column.native_type = native;
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
        let dialect = conn.dialect();
        let mut indexes = Vec::new();

        let info = conn.query(&pragma(dialect, schema, "table_info", table)).await?;
        let pk = primary_key_columns(&info.rows);
        if !pk.is_empty() {
            indexes.push(Index::new(format!("{table}_pkey"), pk).primary());
        }

        let list = conn.query(&pragma(dialect, schema, "index_list", table)).await?;
        for row in &list.rows {
            let origin = row.str_value("origin").unwrap_or_default();
            let name = row.str_value("name").unwrap_or_default();
            let unique = row.bool_value("unique");
            // Auto-indexes backing PRIMARY KEY and UNIQUE constraints are
            // not indexes of their own.
            if origin != "c" {
                continue;
            }
            let columns = index_columns(conn, schema, &name).await?;

            let mut index = Index::new(name, columns);
            index.is_unique = unique;
            indexes.push(index);
        }
        Ok(indexes)
    }

    async fn read_foreign_keys(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<ForeignKey>> {
        let dialect = conn.dialect();
        let result = conn
            .query(&pragma(dialect, schema, "foreign_key_list", table))
            .await?;

        let mut grouped: IndexMap<i64, Vec<&Row>> = IndexMap::new();
        for row in &result.rows {
            grouped.entry(row.i64_value("id").unwrap_or(0)).or_default().push(row);
        }

        let mut fks = Vec::with_capacity(grouped.len());
        for (_, mut rows) in grouped {
            rows.sort_by_key(|r| r.i64_value("seq").unwrap_or(0));
            let Some(first) = rows.first() else { continue };
            let referenced_table = first.str_value("table").unwrap_or_default();
            let columns: Vec<String> = rows.iter().filter_map(|r| r.str_value("from")).collect();
            let mut referenced_columns: Vec<String> =
                rows.iter().filter_map(|r| r.str_value("to")).collect();

            if referenced_columns.len() != columns.len() {
                // `REFERENCES parent` without a column list targets the parent's key.
                let parent = conn
                    .query(&pragma(dialect, schema, "table_info", &referenced_table))
                    .await?;
                referenced_columns = primary_key_columns(&parent.rows);
            }

            let name = format!("{}_{}_fkey", table, columns.join("_"));
            let fk = ForeignKey::new(name, columns, referenced_table, referenced_columns)?
                .on_delete(ReferentialAction::parse(
                    &first.str_value("on_delete").unwrap_or_default(),
                ))
                .on_update(ReferentialAction::parse(
                    &first.str_value("on_update").unwrap_or_default(),
                ));
            fks.push(fk);
        }
        Ok(fks)
    }
}
