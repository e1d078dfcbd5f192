//! # dbsync-engine
//!
//! Orchestration layer of dbsync.
//!
//! - [`SyncService`]: the facade a UI, CLI or API layer calls, addressing
//!   connections by id through an owned [`dbsync_core::ConnectionPool`]
//! - [`GroupOrchestrator`]: concurrent status checks across the targets of
//!   an instance group
//! - [`RowCountCache`]: TTL cache of data diffs, invalidated on writes
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dbsync_engine::{Endpoints, MigrationRequest, SyncService};
//! use dbsync_migrate::InMemoryHistory;
//!
//! let service = SyncService::new(pool, Arc::new(InMemoryHistory::new()));
//! let endpoints = Endpoints::new("prod", "staging").schema("public");
//!
//! let diff = service.compare_schemas(&endpoints).await?;
//! println!("{}", diff.summary());
//!
//! let record = service
//!     .apply_migration(&MigrationRequest::new(endpoints).description("catch up"))
//!     .await?;
//! ```

pub mod cache;
pub mod endpoints;
pub mod group;
pub mod service;

#[cfg(test)]
mod fixture;

pub use cache::{CacheStats, RowCountCache, RowCountKey};
pub use endpoints::Endpoints;
pub use group::{GroupOrchestrator, GroupSyncStatus, InstanceGroupTargetStatus, TargetStatus};
pub use service::{MigrationRequest, SyncService};
