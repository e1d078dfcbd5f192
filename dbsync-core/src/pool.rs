//! Connection pool.
//!
//! The pool owns one [`ConnectionHandle`] per connection id. Handles are
//! created lazily from the [`ConnectionRecord`] held by the metadata store and
//! connect on first use. Because every handle serializes its connector, two
//! operations acquiring the same id share one live connection and take turns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connector::{ConnectionHandle, DatabaseConnector};
use crate::error::SyncResult;
use crate::metadata::{ConnectionRecord, MetadataStore};

/// Builds connectors for connection records.
///
/// Creating a connector must not open a connection; the handle connects
/// lazily.
pub trait ConnectorFactory: Send + Sync {
    /// Create an unconnected connector for `record`.
    fn create(&self, record: &ConnectionRecord) -> SyncResult<Box<dyn DatabaseConnector>>;
}

/// Statistics about pool usage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of handles created.
    pub opens: u64,
    /// Number of times a cached handle was returned.
    pub reuses: u64,
    /// Number of handles released.
    pub releases: u64,
    /// Number of handles currently cached.
    pub cached: usize,
}

/// An explicitly owned pool of connection handles keyed by connection id.
pub struct ConnectionPool {
    metadata: Arc<dyn MetadataStore>,
    factory: Arc<dyn ConnectorFactory>,
    handles: Mutex<HashMap<String, ConnectionHandle>>,
    stats: Mutex<PoolStats>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Create a pool.
    pub fn new(metadata: Arc<dyn MetadataStore>, factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            metadata,
            factory,
            handles: Mutex::new(HashMap::new()),
            stats: Mutex::new(PoolStats::default()),
        }
    }

    /// The metadata store backing this pool.
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Get the handle for a connection id, creating it if needed.
    pub async fn acquire(&self, id: &str) -> SyncResult<ConnectionHandle> {
        if let Some(handle) = self.handles.lock().get(id).cloned() {
            self.stats.lock().reuses += 1;
            return Ok(handle);
        }

        let record = self.metadata.require_connection(id).await?;
        let connector = self.factory.create(&record)?;
        let handle = ConnectionHandle::new(record.info(), connector);

        let mut handles = self.handles.lock();
        let handle = handles.entry(id.to_string()).or_insert(handle).clone();
        let mut stats = self.stats.lock();
        stats.opens += 1;
        stats.cached = handles.len();
        debug!(connection = %id, engine = %record.engine, "Connection handle created");
        Ok(handle)
    }

    /// Register a connector directly, bypassing the factory.
    ///
    /// Replaces any cached handle for the same id.
    pub fn register(&self, record: &ConnectionRecord, connector: Box<dyn DatabaseConnector>) -> ConnectionHandle {
        let handle = ConnectionHandle::new(record.info(), connector);
        let mut handles = self.handles.lock();
        handles.insert(record.id.clone(), handle.clone());
        let mut stats = self.stats.lock();
        stats.opens += 1;
        stats.cached = handles.len();
        handle
    }

    /// Disconnect and evict a connection.
    pub async fn release(&self, id: &str) -> SyncResult<()> {
        let handle = {
            let mut handles = self.handles.lock();
            let handle = handles.remove(id);
            self.stats.lock().cached = handles.len();
            handle
        };
        if let Some(handle) = handle {
            self.stats.lock().releases += 1;
            handle.disconnect().await?;
            debug!(connection = %id, "Connection released");
        }
        Ok(())
    }

    /// Disconnect every cached connection.
    ///
    /// Disconnect failures are logged; every handle is evicted regardless.
    pub async fn close_all(&self) {
        let handles: Vec<ConnectionHandle> = {
            let mut map = self.handles.lock();
            self.stats.lock().cached = 0;
            map.drain().map(|(_, h)| h).collect()
        };
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.disconnect().await {
                warn!(connection = %handle.id(), error = %e, "Disconnect failed");
            }
        }
        self.stats.lock().releases += count as u64;
        info!(count, "Connection pool closed");
    }

    /// Whether a handle is cached for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.handles.lock().contains_key(id)
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.lock().clone()
    }
}
