//! [`DatabaseConnector`] over `tokio-rusqlite`.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use dbsync_core::{
    ColumnMeta, ConnectionRecord, ConnectionTestResult, ConnectorFactory, DatabaseConnector,
    Engine, QueryResult, Row, SyncError, SyncResult,
};
use tokio_rusqlite::Connection;
use tracing::{debug, info, trace};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::types::get_value_at_index;

/// One SQLite connection.
///
/// Every statement runs on the same underlying connection, so session
/// pragmas such as `foreign_keys` persist between calls.
pub struct SqliteConnector {
    name: String,
    config: SqliteConfig,
    conn: Option<Connection>,
}

impl std::fmt::Debug for SqliteConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnector")
            .field("name", &self.name)
            .field("path", &self.config.path)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl SqliteConnector {
    /// Create an unconnected connector.
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            name: config.path.display(),
            config,
            conn: None,
        }
    }

    /// Name used in connection errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Connection settings.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    async fn open(&self) -> SqliteResult<Connection> {
        let conn = match &self.config.path {
            DatabasePath::Memory => Connection::open_in_memory().await?,
            DatabasePath::File(path) => Connection::open(path.clone()).await?,
        };
        let init_sql = self.config.init_sql();
        conn.call(move |conn| Ok(conn.execute_batch(&init_sql)?))
            .await?;
        Ok(conn)
    }

    async fn run(conn: &Connection, sql: &str) -> SqliteResult<QueryResult> {
        let sql = sql.to_string();
        let start = Instant::now();
        let mut result = conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let names: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();

                if names.is_empty() {
                    let affected = stmt.execute([])?;
                    return Ok(QueryResult::affected(affected as u64));
                }

                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut map = Row::new();
                    for (i, name) in names.iter().enumerate() {
                        map.insert(name.clone(), get_value_at_index(row, i));
                    }
                    out.push(map);
                }
                Ok(QueryResult {
                    columns: names.into_iter().map(|n| ColumnMeta::new(n, "")).collect(),
                    row_count: out.len() as u64,
                    rows: out,
                    execution_time_ms: 0,
                })
            })
            .await?;
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn check_connection(&self) -> SqliteResult<QueryResult> {
        const VERSION: &str = "SELECT sqlite_version() AS version";
        match self.conn.as_ref() {
            Some(conn) => Self::run(conn, VERSION).await,
            None => {
                let conn = self.open().await?;
                let result = Self::run(&conn, VERSION).await;
                // Check connections are not kept.
                let _ = conn.close().await;
                result
            }
        }
    }

    fn connection_error(&self, err: SqliteError) -> SyncError {
        SyncError::connection(self.name.clone(), err.message())
    }
}

#[async_trait]
impl DatabaseConnector for SqliteConnector {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn connect(&mut self) -> SyncResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = self.open().await.map_err(|e| self.connection_error(e))?;
        info!(connection = %self.name, path = %self.config.path.display(), "SQLite connection opened");
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) -> SyncResult<()> {
        if let Some(conn) = self.conn.take() {
            debug!(connection = %self.name, "Closing SQLite connection");
            conn.close()
                .await
                .map_err(|e| self.connection_error(e.into()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn query(&mut self, sql: &str) -> SyncResult<QueryResult> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(self.connection_error(SqliteError::NotConnected));
        };
        trace!(connection = %self.name, sql = %sql, "Executing statement");
        match Self::run(conn, sql).await {
            Ok(result) => Ok(result),
            Err(SqliteError::Sqlite(tokio_rusqlite::Error::ConnectionClosed)) => {
                self.conn = None;
                Err(self.connection_error(SqliteError::Sqlite(
                    tokio_rusqlite::Error::ConnectionClosed,
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn test_connection(&mut self) -> ConnectionTestResult {
        let start = Instant::now();
        match self.check_connection().await {
            Ok(result) => ConnectionTestResult {
                success: true,
                message: format!("Connected to {}", self.config.path.display()),
                latency_ms: Some(start.elapsed().as_millis() as u64),
                server_version: result
                    .rows
                    .first()
                    .and_then(|r| r.get("version"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
            Err(e) => ConnectionTestResult::failed(e.message()),
        }
    }
}

/// Creates [`SqliteConnector`]s from stored connection records.
///
/// Relative database paths are resolved against `base_dir` when set.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnectorFactory {
    base_dir: Option<PathBuf>,
}

impl SqliteConnectorFactory {
    /// Create a factory resolving paths against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

impl ConnectorFactory for SqliteConnectorFactory {
    fn create(&self, record: &ConnectionRecord) -> SyncResult<Box<dyn DatabaseConnector>> {
        if record.engine != Engine::Sqlite {
            return Err(SyncError::validation(format!(
                "connection '{}' is {}, not sqlite",
                record.name, record.engine
            )));
        }
        let mut config = SqliteConfig::from_record(record)?;
        if let (Some(base), DatabasePath::File(path)) = (&self.base_dir, &config.path)
            && path.is_relative()
        {
            config.path = DatabasePath::File(base.join(path));
        }
        Ok(Box::new(SqliteConnector::new(config).with_name(&record.name)))
    }
}
