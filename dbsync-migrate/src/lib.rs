//! # dbsync-migrate
//!
//! Schema side of dbsync.
//!
//! This crate provides functionality for:
//! - Introspecting live PostgreSQL, MySQL, MariaDB and SQLite schemas into
//!   the normalized model
//! - Diffing two schema snapshots into an ordered list of changes
//! - Generating dependency-ordered migration DDL for any target engine
//! - Recording generated and applied migrations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Introspector │────▶│ Schema Differ  │────▶│ SQL Gen     │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//!                                            ┌─────────────┐
//!                                            │ History     │
//!                                            └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbsync_migrate::{MigrationGenerator, SchemaDiffer, SchemaIntrospector};
//!
//! let introspector = SchemaIntrospector::new();
//! let source = introspector.introspect(&source_conn, None).await?;
//! let target = introspector.introspect(&target_conn, None).await?;
//!
//! let diff = SchemaDiffer::new().diff(&source, &target);
//! println!("{}", diff.summary());
//!
//! for sql in MigrationGenerator::new().generate(&diff, target_conn.engine()) {
//!     println!("{sql}");
//! }
//! ```

pub mod diff;
pub mod history;
pub mod introspect;
pub mod sql;

pub use diff::{
    ChangeType, DiffEntry, DiffObject, ObjectKind, SchemaDiff, SchemaDiffer, diff_schemas,
};
pub use history::{
    HISTORY_TABLE, InMemoryHistory, MigrationFilter, MigrationHistoryRepository, MigrationRecord,
    SqlHistoryRepository,
};
pub use introspect::{
    CatalogReader, IntrospectionOptions, MySqlCatalog, PostgresCatalog, SchemaBuilder,
    SchemaIntrospector, SqliteCatalog, TableParts, catalog_reader, normalize_default,
};
pub use sql::{MigrationGenerator, REBUILD_PREFIX, generate_migration};
