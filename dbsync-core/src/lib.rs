//! # dbsync-core
//!
//! Shared foundation for the dbsync engine.
//!
//! This crate provides:
//! - The normalized schema model (`Schema`, `Table`, `Column`, `Index`, `ForeignKey`)
//! - The `DatabaseConnector` contract and serialized `ConnectionHandle`s
//! - An explicitly owned `ConnectionPool` keyed by connection id
//! - `EngineDialect` implementations for PostgreSQL, MySQL, MariaDB and SQLite
//! - Foreign-key dependency ordering with deterministic cycle breaking
//! - Connection / instance-group metadata and the `MetadataStore` contract
//! - `dbsync.toml` configuration and logging setup
//!
//! With the `testing` feature, [`testing::MockConnector`] provides a scripted
//! connector with a statement log for call-order assertions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbsync_core::{ConnectionHandle, ConnectionInfo, Engine};
//!
//! let handle = ConnectionHandle::new(
//!     ConnectionInfo::new("analytics", Engine::Postgres),
//!     Box::new(my_connector),
//! );
//! let rows = handle.query("SELECT 1").await?;
//! ```

pub mod config;
pub mod connector;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod model;
pub mod order;
pub mod pool;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use config::{DumpDefaults, EngineSettings, LogFormat, LoggingConfig, SyncConfig, SyncDefaults};
pub use connector::{
    ColumnMeta, ConnectionHandle, ConnectionInfo, ConnectionTestResult, DatabaseConnector,
    QueryResult, Row, RowExt, Session,
};
pub use dialect::{ColumnAlteration, EngineDialect};
pub use engine::Engine;
pub use error::{ErrorKind, SyncError, SyncResult};
pub use metadata::{ConnectionRecord, InMemoryMetadataStore, InstanceGroup, MetadataStore, Project};
pub use model::{Column, ForeignKey, Index, ReferentialAction, Schema, Table};
pub use order::{DeferredEdge, DependencyGraph, LoadOrder};
pub use pool::{ConnectionPool, ConnectorFactory, PoolStats};
pub use value::{
    BINARY_TAG, RowKey, as_binary, binary_value, canonical_text, row_key, rows_differ,
    values_equal,
};
