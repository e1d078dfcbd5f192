//! Error types shared by every dbsync crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for dbsync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while comparing or synchronizing databases.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The connection is unreachable or rejected the credentials.
    #[error("Connection error [{connection}]: {message}")]
    Connection {
        /// Connection id or name.
        connection: String,
        /// Driver message.
        message: String,
    },

    /// The catalog could not be read or uses an unsupported feature.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// A required option or precondition is missing.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A statement failed at the database.
    #[error("Execution error: {message}")]
    Execution {
        /// The statement that failed, when known.
        statement: Option<String>,
        /// Database message.
        message: String,
    },

    /// A migration failed part-way on an engine without transactional DDL.
    /// The statements in `applied` stay in effect.
    #[error("Migration stopped after {} of {total} statements: {source}", .applied.len())]
    PartialMigration {
        /// Statements that ran before the failure, in order.
        applied: Vec<String>,
        /// Statements in the migration.
        total: usize,
        /// History record holding `applied`.
        record_id: Option<String>,
        /// The failure.
        source: Box<SyncError>,
    },

    /// The foreign-key graph could not be fully ordered.
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serializable discriminant of [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Introspection,
    Validation,
    Execution,
    DependencyCycle,
    NotFound,
    Config,
    Serialization,
}

impl SyncError {
    /// Create a connection error.
    pub fn connection(connection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            connection: connection.into(),
            message: message.into(),
        }
    }

    /// Create an introspection error.
    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an execution error without statement context.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            statement: None,
            message: msg.into(),
        }
    }

    /// Create an execution error for a specific statement.
    pub fn statement_failed(statement: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Execution {
            statement: Some(statement.into()),
            message: msg.into(),
        }
    }

    /// Create a dependency cycle error.
    pub fn dependency_cycle(msg: impl Into<String>) -> Self {
        Self::DependencyCycle(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Introspection(_) => ErrorKind::Introspection,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Execution { .. } | Self::PartialMigration { .. } => ErrorKind::Execution,
            Self::DependencyCycle(_) => ErrorKind::DependencyCycle,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// The failing statement, for execution errors.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Execution { statement, .. } => statement.as_deref(),
            Self::PartialMigration { source, .. } => source.statement(),
            _ => None,
        }
    }

    /// Statements left applied by a failed migration.
    pub fn applied_statements(&self) -> &[String] {
        match self {
            Self::PartialMigration { applied, .. } => applied,
            _ => &[],
        }
    }

    /// Whether this error leaves the connection unusable for the current operation.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
