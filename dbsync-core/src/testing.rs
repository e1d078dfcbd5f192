//! Scripted connector for tests.
//!
//! [`MockConnector`] answers statements by SQL substring and records every
//! statement it sees in a shared [`MockLog`], so tests can assert on call
//! order after the connector has been moved into a handle.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::connector::{ConnectionTestResult, DatabaseConnector, QueryResult, Row};
use crate::engine::Engine;
use crate::error::{SyncError, SyncResult};

/// Shared record of executed statements.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<Vec<String>>>);

impl MockLog {
    /// Every statement in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Index of the first statement containing `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.0.lock().iter().position(|s| s.contains(pattern))
    }

    /// Whether any statement contains `pattern`.
    pub fn contains(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }

    /// Number of statements containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.0.lock().iter().filter(|s| s.contains(pattern)).count()
    }

    /// Forget recorded statements.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, sql: &str) {
        self.0.lock().push(sql.to_string());
    }
}

/// A connector answering from a script.
///
/// Failure rules are checked before responses; within each list the first
/// matching pattern wins. Unmatched statements succeed with no rows.
#[derive(Debug)]
pub struct MockConnector {
    engine: Engine,
    connected: bool,
    responses: Vec<(String, QueryResult)>,
    failures: Vec<(String, String)>,
    connect_error: Option<String>,
    log: MockLog,
}

impl MockConnector {
    /// Create a connector for `engine`.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            connected: false,
            responses: Vec::new(),
            failures: Vec::new(),
            connect_error: None,
            log: MockLog::default(),
        }
    }

    /// Answer statements containing `pattern` with `result`.
    pub fn respond(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.responses.push((pattern.into(), result));
        self
    }

    /// Answer statements containing `pattern` with JSON object rows.
    pub fn respond_rows(self, pattern: impl Into<String>, rows: Vec<Value>) -> Self {
        let rows = rows.into_iter().filter_map(into_row).collect();
        self.respond(pattern, QueryResult::from_rows(rows))
    }

    /// Fail statements containing `pattern`.
    pub fn fail_on(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.push((pattern.into(), message.into()));
        self
    }

    /// Fail every connection attempt.
    pub fn fail_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Handle to the statement log.
    pub fn log(&self) -> MockLog {
        self.log.clone()
    }
}

fn into_row(value: Value) -> Option<Row> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[async_trait]
impl DatabaseConnector for MockConnector {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn connect(&mut self) -> SyncResult<()> {
        if let Some(message) = &self.connect_error {
            return Err(SyncError::connection("mock", message.clone()));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> SyncResult<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn query(&mut self, sql: &str) -> SyncResult<QueryResult> {
        self.log.push(sql);
        if let Some((_, message)) = self.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            return Err(SyncError::execution(message.clone()));
        }
        Ok(self
            .responses
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }

    async fn test_connection(&mut self) -> ConnectionTestResult {
        match &self.connect_error {
            Some(message) => ConnectionTestResult::failed(message.clone()),
            None => ConnectionTestResult {
                success: true,
                message: "ok".to_string(),
                latency_ms: Some(0),
                server_version: Some(format!("mock-{}", self.engine)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectionHandle, ConnectionInfo};
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_responses_and_log() {
        let mock = MockConnector::new(Engine::Sqlite)
            .respond_rows("COUNT(*)", vec![json!({"row_count": 3})])
            .fail_on("DROP", "permission denied");
        let log = mock.log();
        let handle = ConnectionHandle::new(ConnectionInfo::new("m", Engine::Sqlite), Box::new(mock));

        let count = handle.query("SELECT COUNT(*) FROM t").await.unwrap();
        assert_eq!(count.scalar_i64(), Some(3));

        let err = handle.query("DROP TABLE t").await.unwrap_err();
        assert_eq!(err.statement(), Some("DROP TABLE t"));

        assert!(handle.query("UPDATE t SET a = 1").await.unwrap().rows.is_empty());
        assert_eq!(log.statements().len(), 3);
        assert_eq!(log.position("DROP"), Some(1));
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let mock = MockConnector::new(Engine::Postgres).fail_connect("refused");
        let handle = ConnectionHandle::new(ConnectionInfo::new("m", Engine::Postgres), Box::new(mock));
        let err = handle.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, SyncError::Connection { .. }));
        assert!(!handle.test_connection().await.success);
    }
}
