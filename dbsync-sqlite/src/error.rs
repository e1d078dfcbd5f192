//! Error types for the SQLite connector.

use dbsync_core::SyncError;
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A query was issued before `connect`.
    #[error("not connected")]
    NotConnected,
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Driver message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Sqlite(tokio_rusqlite::Error::Rusqlite(e)) => e.to_string(),
            Self::Sqlite(e) => e.to_string(),
            Self::Config(msg) => msg.clone(),
            Self::NotConnected => "not connected".to_string(),
        }
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for SyncError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Config(msg) => SyncError::config(msg),
            SqliteError::NotConnected => SyncError::connection("sqlite", "not connected"),
            SqliteError::Sqlite(tokio_rusqlite::Error::ConnectionClosed) => {
                SyncError::connection("sqlite", "connection closed")
            }
            other => SyncError::execution(other.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbsync_core::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_error_conversion() {
        let err: SyncError = SqliteError::from(rusqlite::Error::InvalidQuery).into();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err: SyncError = SqliteError::NotConnected.into();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.is_connection_fatal());

        let err: SyncError = SqliteError::config("bad").into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
