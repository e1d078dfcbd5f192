//! # dbsync-data
//!
//! Data side of dbsync.
//!
//! - [`compute_table_diffs`]: per-table row counts and primary-key presence
//! - [`sync_table`] / [`sync_tables`]: incremental "source wins" reconciliation
//! - [`dump_and_restore`]: truncate and reload in FK dependency order
//!
//! Every operation works on a [`ConnectionPair`]. Reads go through
//! [`ConnectionHandle::query`](dbsync_core::ConnectionHandle::query); values
//! are compared by canonical text so rows read from different engines line up.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbsync_data::{ConnectionPair, SyncOptions, sync_tables};
//!
//! let pair = ConnectionPair::resolve(source, target, None, None)?;
//! let report = sync_tables(&pair, &schema, &["customers".into(), "orders".into()], &SyncOptions::all()).await;
//! println!("{} succeeded, {} failed", report.succeeded, report.failed);
//! ```

pub mod compare;
pub mod dump;
pub mod pair;
pub mod sync;
mod write;

pub use compare::{TableDataDiff, compute_table_diffs, diff_table, summarize};
pub use dump::{DumpOptions, DumpRestoreResult, TableDumpResult, dump_and_restore};
pub use pair::ConnectionPair;
pub use sync::{BatchSyncReport, SyncOptions, SyncOutcome, TableSyncResult, sync_table, sync_tables};
