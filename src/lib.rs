//! # dbsync
//!
//! Schema and data synchronization across heterogeneous SQL databases.
//!
//! dbsync provides:
//! - Schema introspection for PostgreSQL, MySQL, MariaDB and SQLite into one
//!   normalized model
//! - Structural schema diffs and dependency-ordered migration DDL per engine
//! - Row-count and key-presence data diffs, row reconciliation and full
//!   dump & restore in foreign-key order
//! - Instance groups: one source kept in sync with many targets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dbsync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> SyncResult<()> {
//!     let metadata = Arc::new(InMemoryMetadataStore::new());
//!     metadata.put_connection(
//!         ConnectionRecord::new("prod", "production", Engine::Sqlite).with_database("prod.db"),
//!     );
//!     metadata.put_connection(
//!         ConnectionRecord::new("dev", "development", Engine::Sqlite).with_database("dev.db"),
//!     );
//!
//!     let pool = Arc::new(ConnectionPool::new(metadata, Arc::new(SqliteConnectorFactory::new())));
//!     let service = SyncService::new(pool, Arc::new(InMemoryHistory::new()));
//!
//!     let endpoints = Endpoints::new("prod", "dev");
//!     let diff = service.compare_schemas(&endpoints).await?;
//!     println!("{}", diff.summary());
//!
//!     service.apply_migration(&MigrationRequest::new(endpoints)).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Model, connectors, dialects, configuration and logging.
pub mod core {
    pub use dbsync_core::*;
}

/// Introspection, diffing, migration SQL and history.
pub mod migrate {
    pub use dbsync_migrate::*;
}

/// Data diff, row reconciliation and dump & restore.
pub mod data {
    pub use dbsync_data::*;
}

/// Service facade and instance-group orchestration.
pub mod engine {
    pub use dbsync_engine::*;
}

/// SQLite connector.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use dbsync_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use dbsync_core::{
        ConnectionPool, ConnectionRecord, Engine, InMemoryMetadataStore, InstanceGroup,
        MetadataStore, SyncConfig, SyncError, SyncResult,
    };
    pub use dbsync_data::{DumpOptions, SyncOptions};
    pub use dbsync_engine::{Endpoints, MigrationRequest, SyncService, TargetStatus};
    pub use dbsync_migrate::{InMemoryHistory, MigrationFilter, SqlHistoryRepository};

    #[cfg(feature = "sqlite")]
    pub use dbsync_sqlite::SqliteConnectorFactory;
}

// Re-export key types at the crate root
pub use dbsync_core::{ErrorKind, SyncError, SyncResult};
pub use dbsync_engine::SyncService;
