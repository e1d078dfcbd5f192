//! The connector contract consumed by the engine.
//!
//! Wire drivers live outside dbsync. Each one implements
//! [`DatabaseConnector`] and is wrapped in a [`ConnectionHandle`], which
//! serializes statements so that a connector never sees concurrent queries.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

use crate::dialect::EngineDialect;
use crate::engine::Engine;
use crate::error::{SyncError, SyncResult};

/// One result row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Column metadata returned with a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

impl ColumnMeta {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Result of a single statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    /// Rows returned, or rows affected for statements without a result set.
    pub row_count: u64,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Build a result from rows, deriving columns from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.keys().map(|k| ColumnMeta::new(k.clone(), "")).collect())
            .unwrap_or_default();
        Self {
            columns,
            row_count: rows.len() as u64,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Result of a statement that affected `count` rows.
    pub fn affected(count: u64) -> Self {
        Self {
            row_count: count,
            ..Default::default()
        }
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// First column of the first row as an integer (for `COUNT(*)`).
    pub fn scalar_i64(&self) -> Option<i64> {
        let row = self.rows.first()?;
        let value = match self.columns.first() {
            Some(col) => row.get_ci(&col.name),
            None => row.values().next(),
        }?;
        value_as_i64(value)
    }
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}

impl ConnectionTestResult {
    /// A failed check.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            latency_ms: None,
            server_version: None,
        }
    }
}

/// A connection-scoped database driver.
///
/// Implementations are not required to support concurrent queries; the
/// `&mut self` receivers make exclusive access explicit.
#[async_trait::async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Engine family of the server behind this connector.
    fn engine(&self) -> Engine;

    /// Open the underlying network connection.
    async fn connect(&mut self) -> SyncResult<()>;

    /// Close the underlying connection.
    async fn disconnect(&mut self) -> SyncResult<()>;

    /// Whether the connection is open.
    fn is_connected(&self) -> bool;

    /// Run one SQL statement.
    async fn query(&mut self, sql: &str) -> SyncResult<QueryResult>;

    /// Check the connection.
    async fn test_connection(&mut self) -> ConnectionTestResult;
}

/// Identity of a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub name: String,
    pub engine: Engine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Preferred schema when the caller does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ConnectionInfo {
    /// Create connection info with no database or schema preference.
    pub fn new(id: impl Into<String>, engine: Engine) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            engine,
            database: None,
            schema: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the preferred schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Resolve the schema an operation should target.
    ///
    /// An explicit request wins, then the connection's preferred schema, then
    /// the engine default. MySQL and MariaDB fall back to the database name.
    pub fn resolve_schema(&self, requested: Option<&str>) -> SyncResult<String> {
        if let Some(s) = requested.filter(|s| !s.is_empty()) {
            return Ok(s.to_string());
        }
        if let Some(s) = self.schema.as_deref().filter(|s| !s.is_empty()) {
            return Ok(s.to_string());
        }
        if self.engine.schema_is_database() {
            return self
                .database
                .clone()
                .filter(|d| !d.is_empty())
                .ok_or_else(|| {
                    SyncError::validation(format!(
                        "connection '{}' has no database; a schema name is required",
                        self.name
                    ))
                });
        }
        self.engine
            .default_schema()
            .map(str::to_string)
            .ok_or_else(|| SyncError::validation("schema name is required"))
    }
}

/// A shared, serialized handle to one connector.
///
/// Cloning is cheap; all clones share the same connector. Each call to
/// [`query`](Self::query) holds the connector for one statement only. Use
/// [`session`](Self::session) when several statements must run back to back
/// on the same session (e.g. after disabling FK checks).
#[derive(Clone)]
pub struct ConnectionHandle {
    info: Arc<ConnectionInfo>,
    connector: Arc<Mutex<Box<dyn DatabaseConnector>>>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Wrap a connector.
    pub fn new(info: ConnectionInfo, connector: Box<dyn DatabaseConnector>) -> Self {
        Self {
            info: Arc::new(info),
            connector: Arc::new(Mutex::new(connector)),
        }
    }

    /// Connection identity.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Connection id.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Engine family.
    pub fn engine(&self) -> Engine {
        self.info.engine
    }

    /// SQL dialect for this connection.
    pub fn dialect(&self) -> &'static dyn EngineDialect {
        self.info.engine.dialect()
    }

    /// Whether two handles refer to the same connection.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.connector, &other.connector) || self.info.id == other.info.id
    }

    /// Acquire exclusive access, connecting lazily.
    pub async fn session(&self) -> SyncResult<Session> {
        let mut guard = self.connector.clone().lock_owned().await;
        if !guard.is_connected() {
            debug!(connection = %self.info.id, "Connecting");
            guard.connect().await.map_err(|e| match e {
                SyncError::Connection { .. } => e,
                other => SyncError::connection(self.info.name.clone(), other.to_string()),
            })?;
        }
        Ok(Session {
            guard,
            info: self.info.clone(),
        })
    }

    /// Run one statement.
    pub async fn query(&self, sql: &str) -> SyncResult<QueryResult> {
        let mut session = self.session().await?;
        session.query(sql).await
    }

    /// Check the connection without connecting lazily first.
    pub async fn test_connection(&self) -> ConnectionTestResult {
        let mut guard = self.connector.lock().await;
        guard.test_connection().await
    }

    /// Close the connector if open.
    pub async fn disconnect(&self) -> SyncResult<()> {
        let mut guard = self.connector.lock().await;
        if guard.is_connected() {
            guard.disconnect().await?;
        }
        Ok(())
    }
}

/// Exclusive access to one connection for a sequence of statements.
pub struct Session {
    guard: OwnedMutexGuard<Box<dyn DatabaseConnector>>,
    info: Arc<ConnectionInfo>,
}

impl Session {
    /// Connection identity.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// SQL dialect for this session.
    pub fn dialect(&self) -> &'static dyn EngineDialect {
        self.info.engine.dialect()
    }

    /// Run one statement, attaching the SQL to execution errors.
    pub async fn query(&mut self, sql: &str) -> SyncResult<QueryResult> {
        trace!(connection = %self.info.id, sql = %sql, "Executing statement");
        let start = Instant::now();
        let result = self.guard.query(sql).await.map_err(|e| match e {
            SyncError::Execution {
                statement: None,
                message,
            } => SyncError::statement_failed(sql, message),
            other => other,
        });
        match &result {
            Ok(r) => debug!(
                connection = %self.info.id,
                rows = r.row_count,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Statement finished"
            ),
            Err(e) => warn!(connection = %self.info.id, error = %e, "Statement failed"),
        }
        result
    }
}

/// Typed, case-insensitive accessors for catalog rows.
///
/// Catalog queries alias their columns in lower case, but some servers
/// (MySQL 8) still return upper-case keys.
pub trait RowExt {
    /// Look up a value by exact key, then case-insensitively.
    fn get_ci(&self, key: &str) -> Option<&Value>;

    /// Value as a string; `None` for SQL NULL.
    fn str_value(&self, key: &str) -> Option<String> {
        match self.get_ci(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Value as an integer.
    fn i64_value(&self, key: &str) -> Option<i64> {
        self.get_ci(key).and_then(value_as_i64)
    }

    /// Value as a boolean (`true`, `1`, `YES`, `t`).
    fn bool_value(&self, key: &str) -> bool {
        match self.get_ci(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            Some(Value::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "yes" | "true" | "t" | "1" | "y"
            ),
            _ => false,
        }
    }
}

impl RowExt for Row {
    fn get_ci(&self, key: &str) -> Option<&Value> {
        self.get(key).or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}
