//! SQLite connector for dbsync.
//!
//! Implements [`dbsync_core::DatabaseConnector`] on top of `tokio-rusqlite`,
//! returning every row as a JSON map. [`SqliteConnectorFactory`] plugs the
//! connector into a [`dbsync_core::ConnectionPool`].
//!
//! # Example
//!
//! ```rust,ignore
//! use dbsync_core::{ConnectionHandle, ConnectionInfo, Engine};
//! use dbsync_sqlite::{SqliteConfig, SqliteConnector};
//!
//! let connector = SqliteConnector::new(SqliteConfig::from_url("sqlite://./app.db")?);
//! let handle = ConnectionHandle::new(ConnectionInfo::new("app", Engine::Sqlite), Box::new(connector));
//! let rows = handle.query("SELECT * FROM users").await?.rows;
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use connector::{SqliteConnector, SqliteConnectorFactory};
pub use error::{SqliteError, SqliteResult};
