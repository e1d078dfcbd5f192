//! Migration history tracking.
//!
//! History is append-only: records are written once and can only be deleted
//! by id. The instance group is stored as a bare id; its display name is
//! resolved when records are read, so renamed or deleted groups show up as
//! they currently are.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dbsync_core::{
    ConnectionHandle, Engine, EngineDialect, Row, RowExt, SyncError, SyncResult,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Name of the history table written by [`SqlHistoryRepository`].
pub const HISTORY_TABLE: &str = "_dbsync_migrations";

/// A generated or applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub id: String,
    pub source_connection_id: String,
    pub target_connection_id: String,
    pub source_schema: String,
    pub target_schema: String,
    /// Instance group the migration was made for. Not checked on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Current name of `group_id`; filled in at read time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub sql_statements: Vec<String>,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    /// The migration failed part-way; `sql_statements` holds only the
    /// statements that ran.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

impl MigrationRecord {
    /// Create a record with a fresh id, stamped now.
    pub fn new(
        source_connection_id: impl Into<String>,
        target_connection_id: impl Into<String>,
        source_schema: impl Into<String>,
        target_schema: impl Into<String>,
        sql_statements: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_connection_id: source_connection_id.into(),
            target_connection_id: target_connection_id.into(),
            source_schema: source_schema.into(),
            target_schema: target_schema.into(),
            group_id: None,
            group_name: None,
            sql_statements,
            description: String::new(),
            applied_at: Utc::now(),
            partial: false,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the record as a partially applied migration.
    pub fn partially_applied(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Tag the record with an instance group.
    pub fn with_group(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id.filter(|g| !g.is_empty());
        self
    }
}

/// Selection of history records. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl MigrationFilter {
    /// Match every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only migrations applied to `connection_id`.
    pub fn target(mut self, connection_id: impl Into<String>) -> Self {
        self.target_connection_id = Some(connection_id.into());
        self
    }

    /// Only migrations tagged with `group_id`.
    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Return at most `limit` records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` passes the filter, ignoring the limit.
    pub fn matches(&self, record: &MigrationRecord) -> bool {
        self.target_connection_id
            .as_ref()
            .is_none_or(|t| *t == record.target_connection_id)
            && self
                .group_id
                .as_ref()
                .is_none_or(|g| record.group_id.as_ref() == Some(g))
    }
}

/// Migration history repository.
#[async_trait]
pub trait MigrationHistoryRepository: Send + Sync {
    /// Create the backing storage if needed.
    async fn initialize(&self) -> SyncResult<()>;

    /// Append a record.
    async fn record(&self, record: &MigrationRecord) -> SyncResult<()>;

    /// Records matching `filter`, newest first.
    async fn list(&self, filter: &MigrationFilter) -> SyncResult<Vec<MigrationRecord>>;

    /// One record by id.
    async fn get(&self, id: &str) -> SyncResult<Option<MigrationRecord>>;

    /// Delete a record. Returns whether it existed.
    async fn delete(&self, id: &str) -> SyncResult<bool>;
}

/// History kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<MigrationRecord>>,
}

impl InMemoryHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MigrationHistoryRepository for InMemoryHistory {
    async fn initialize(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn record(&self, record: &MigrationRecord) -> SyncResult<()> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.id == record.id) {
            return Err(SyncError::validation(format!(
                "migration '{}' is already recorded",
                record.id
            )));
        }
        let mut stored = record.clone();
        stored.group_name = None;
        records.push(stored);
        Ok(())
    }

    async fn list(&self, filter: &MigrationFilter) -> SyncResult<Vec<MigrationRecord>> {
        let mut matching: Vec<MigrationRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps; reverse it.
        matching.reverse();
        matching.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn get(&self, id: &str) -> SyncResult<Option<MigrationRecord>> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn delete(&self, id: &str) -> SyncResult<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}

/// History persisted in the [`HISTORY_TABLE`] of a database.
#[derive(Debug, Clone)]
pub struct SqlHistoryRepository {
    conn: ConnectionHandle,
    schema: Option<String>,
}

const COLUMNS: &str = "id, source_connection_id, target_connection_id, source_schema, \
                       target_schema, group_id, sql_statements, description, applied_at, partial";

impl SqlHistoryRepository {
    /// Store history through `conn`, in its default namespace.
    pub fn new(conn: ConnectionHandle) -> Self {
        Self { conn, schema: None }
    }

    /// Store history in `schema`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    fn dialect(&self) -> &'static dyn EngineDialect {
        self.conn.dialect()
    }

    fn table(&self) -> String {
        self.dialect().qualify(self.schema.as_deref(), HISTORY_TABLE)
    }

    fn literal(&self, value: &str) -> String {
        self.dialect().render_value(&Value::from(value))
    }

    fn optional_literal(&self, value: Option<&str>) -> String {
        value.map_or_else(|| "NULL".to_string(), |v| self.literal(v))
    }

    /// `CREATE TABLE` for the connection's engine.
    pub fn create_table_sql(&self) -> String {
        let (key, text, long_text) = match self.conn.engine() {
            Engine::MySql | Engine::MariaDb => ("VARCHAR(64)", "VARCHAR(255)", "LONGTEXT"),
            Engine::Postgres | Engine::Sqlite => ("VARCHAR(64)", "VARCHAR(255)", "TEXT"),
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             id {key} NOT NULL PRIMARY KEY,\n    \
             source_connection_id {text} NOT NULL,\n    \
             target_connection_id {text} NOT NULL,\n    \
             source_schema {text} NOT NULL,\n    \
             target_schema {text} NOT NULL,\n    \
             group_id {text},\n    \
             sql_statements {long_text} NOT NULL,\n    \
             description {long_text} NOT NULL,\n    \
             applied_at VARCHAR(40) NOT NULL,\n    \
             partial INTEGER NOT NULL DEFAULT 0\n)",
            table = self.table()
        )
    }

    fn select_sql(&self, filter: &MigrationFilter) -> String {
        let mut conditions = Vec::new();
        if let Some(target) = &filter.target_connection_id {
            conditions.push(format!("target_connection_id = {}", self.literal(target)));
        }
        if let Some(group) = &filter.group_id {
            conditions.push(format!("group_id = {}", self.literal(group)));
        }

        let mut sql = format!("SELECT {COLUMNS} FROM {}", self.table());
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY applied_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push(' ');
            sql.push_str(&self.dialect().limit_offset(limit as u64, 0));
        }
        sql
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort as text.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_from_row(row: &Row) -> SyncResult<MigrationRecord> {
    let text = |key: &str| row.str_value(key).unwrap_or_default();
    let statements: Vec<String> = serde_json::from_str(&text("sql_statements"))?;
    let applied_at = DateTime::parse_from_rfc3339(&text("applied_at"))
        .map_err(|e| {
            SyncError::execution(format!(
                "invalid applied_at on migration '{}': {e}",
                text("id")
            ))
        })?
        .with_timezone(&Utc);

    Ok(MigrationRecord {
        id: text("id"),
        source_connection_id: text("source_connection_id"),
        target_connection_id: text("target_connection_id"),
        source_schema: text("source_schema"),
        target_schema: text("target_schema"),
        group_id: row.str_value("group_id"),
        group_name: None,
        sql_statements: statements,
        description: text("description"),
        applied_at,
        partial: row.i64_value("partial").unwrap_or_default() != 0,
    })
}

#[async_trait]
impl MigrationHistoryRepository for SqlHistoryRepository {
    async fn initialize(&self) -> SyncResult<()> {
        self.conn.query(&self.create_table_sql()).await?;
        debug!(connection = %self.conn.id(), table = %self.table(), "History table ready");
        Ok(())
    }

    async fn record(&self, record: &MigrationRecord) -> SyncResult<()> {
        let statements = serde_json::to_string(&record.sql_statements)?;
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            self.table(),
            self.literal(&record.id),
            self.literal(&record.source_connection_id),
            self.literal(&record.target_connection_id),
            self.literal(&record.source_schema),
            self.literal(&record.target_schema),
            self.optional_literal(record.group_id.as_deref()),
            self.literal(&statements),
            self.literal(&record.description),
            self.literal(&format_timestamp(&record.applied_at)),
            u8::from(record.partial),
        );
        self.conn.query(&sql).await?;
        info!(
            migration = %record.id,
            target = %record.target_connection_id,
            statements = record.sql_statements.len(),
            "Migration recorded"
        );
        Ok(())
    }

    async fn list(&self, filter: &MigrationFilter) -> SyncResult<Vec<MigrationRecord>> {
        let result = self.conn.query(&self.select_sql(filter)).await?;
        result.rows.iter().map(record_from_row).collect()
    }

    async fn get(&self, id: &str) -> SyncResult<Option<MigrationRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE id = {}",
            self.table(),
            self.literal(id)
        );
        let result = self.conn.query(&sql).await?;
        result.rows.first().map(record_from_row).transpose()
    }

    async fn delete(&self, id: &str) -> SyncResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = {}", self.table(), self.literal(id));
        let result = self.conn.query(&sql).await?;
        Ok(result.row_count > 0)
    }
}
