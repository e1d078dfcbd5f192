//! Source/target connection pairs and the row reads shared by every engine
//! in this crate.

use dbsync_core::{ConnectionHandle, EngineDialect, Row, SyncError, SyncResult};

/// A source and a target, each with the schema an operation works in.
#[derive(Debug, Clone)]
pub struct ConnectionPair {
    pub source: ConnectionHandle,
    pub target: ConnectionHandle,
    pub source_schema: String,
    pub target_schema: String,
}

impl ConnectionPair {
    /// Create a pair with explicit schemas.
    pub fn new(
        source: ConnectionHandle,
        target: ConnectionHandle,
        source_schema: impl Into<String>,
        target_schema: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            source_schema: source_schema.into(),
            target_schema: target_schema.into(),
        }
    }

    /// Create a pair, resolving missing schemas from each connection.
    pub fn resolve(
        source: ConnectionHandle,
        target: ConnectionHandle,
        source_schema: Option<&str>,
        target_schema: Option<&str>,
    ) -> SyncResult<Self> {
        let source_schema = source.info().resolve_schema(source_schema)?;
        let target_schema = target.info().resolve_schema(target_schema)?;
        Ok(Self::new(source, target, source_schema, target_schema))
    }

    /// Reject pairs that would write into the data they read.
    pub fn ensure_distinct(&self) -> SyncResult<()> {
        if self.source.same_connection(&self.target) && self.source_schema == self.target_schema {
            return Err(SyncError::validation(format!(
                "source and target are the same ('{}', schema '{}')",
                self.source.info().name,
                self.source_schema
            )));
        }
        Ok(())
    }

    /// Reject pairs sharing one connection.
    ///
    /// Operations that hold a target session while reading the source would
    /// wait on themselves.
    pub fn ensure_separate_connections(&self) -> SyncResult<()> {
        if self.source.same_connection(&self.target) {
            return Err(SyncError::validation(format!(
                "source and target must be different connections (both are '{}')",
                self.source.info().name
            )));
        }
        Ok(())
    }

    /// Qualified name of a source table.
    pub fn source_table(&self, table: &str) -> String {
        self.source.dialect().qualify(Some(&self.source_schema), table)
    }

    /// Qualified name of a target table.
    pub fn target_table(&self, table: &str) -> String {
        self.target.dialect().qualify(Some(&self.target_schema), table)
    }
}

/// `SELECT` of `columns` from `qualified`, ordered by `order_by`.
pub(crate) fn select_sql(
    dialect: &dyn EngineDialect,
    qualified: &str,
    columns: &[String],
    order_by: &[String],
) -> String {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        dialect.quote_list(columns)
    };
    let mut sql = format!("SELECT {projection} FROM {qualified}");
    if !order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&dialect.quote_list(order_by));
    }
    sql
}

/// Read every row of `base`, a page at a time when it is ordered.
///
/// Unordered reads are not paged: `LIMIT/OFFSET` without an order is not
/// stable across pages.
pub(crate) async fn fetch_all(
    conn: &ConnectionHandle,
    base: &str,
    ordered: bool,
    batch_size: usize,
) -> SyncResult<Vec<Row>> {
    if !ordered || batch_size == 0 {
        return Ok(conn.query(base).await?.rows);
    }
    let mut rows = Vec::new();
    let mut offset = 0u64;
    loop {
        let sql = format!(
            "{base} {}",
            conn.dialect().limit_offset(batch_size as u64, offset)
        );
        let page = conn.query(&sql).await?.rows;
        let fetched = page.len();
        rows.extend(page);
        if fetched < batch_size {
            return Ok(rows);
        }
        offset += fetched as u64;
    }
}

/// `COUNT(*)` of a table.
pub(crate) async fn count_rows(conn: &ConnectionHandle, qualified: &str) -> SyncResult<u64> {
    let sql = conn.dialect().count_rows(qualified);
    let result = conn.query(&sql).await?;
    result
        .scalar_i64()
        .map(|n| n.max(0) as u64)
        .ok_or_else(|| SyncError::statement_failed(sql, "row count query returned no value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbsync_core::testing::MockConnector;
    use dbsync_core::{ConnectionInfo, Engine};
    use serde_json::json;

    fn handle(id: &str, mock: MockConnector) -> ConnectionHandle {
        ConnectionHandle::new(ConnectionInfo::new(id, Engine::Sqlite), Box::new(mock))
    }

    #[test]
    fn test_ensure_distinct() {
        let a = handle("a", MockConnector::new(Engine::Sqlite));
        let same = ConnectionPair::new(a.clone(), a.clone(), "main", "main");
        assert!(same.ensure_distinct().is_err());

        let other_schema = ConnectionPair::new(a.clone(), a, "main", "aux");
        assert!(other_schema.ensure_distinct().is_ok());
        assert!(other_schema.ensure_separate_connections().is_err());
    }

    #[test]
    fn test_select_sql() {
        let dialect = Engine::Postgres.dialect();
        assert_eq!(
            select_sql(dialect, "\"public\".\"t\"", &["id".into(), "name".into()], &["id".into()]),
            "SELECT \"id\", \"name\" FROM \"public\".\"t\" ORDER BY \"id\""
        );
        assert_eq!(select_sql(dialect, "\"t\"", &[], &[]), "SELECT * FROM \"t\"");
    }

    #[tokio::test]
    async fn test_fetch_all_pages_until_short_page() {
        let mock = MockConnector::new(Engine::Sqlite)
            .respond_rows("OFFSET 0", vec![json!({"id": 1}), json!({"id": 2})])
            .respond_rows("OFFSET 2", vec![json!({"id": 3})]);
        let log = mock.log();
        let conn = handle("a", mock);

        let rows = fetch_all(&conn, "SELECT \"id\" FROM \"t\" ORDER BY \"id\"", true, 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(log.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_count_rows() {
        let mock = MockConnector::new(Engine::Sqlite)
            .respond_rows("COUNT(*)", vec![json!({"row_count": 7})]);
        let conn = handle("a", mock);
        assert_eq!(count_rows(&conn, "\"t\"").await.unwrap(), 7);

        let empty = handle("b", MockConnector::new(Engine::Sqlite));
        assert!(count_rows(&empty, "\"t\"").await.is_err());
    }
}
