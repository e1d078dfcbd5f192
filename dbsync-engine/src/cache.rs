//! Row-count cache.
//!
//! `COUNT(*)` and key scans are expensive, so data diffs are kept for a
//! configurable time-to-live. Entries are keyed by both connections and both
//! schemas; any write through the service invalidates every entry touching
//! the written connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dbsync_data::TableDataDiff;
use parking_lot::RwLock;
use tracing::trace;

/// Identity of a cached data diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowCountKey {
    pub source_id: String,
    pub target_id: String,
    pub source_schema: String,
    pub target_schema: String,
}

impl RowCountKey {
    /// Create a key.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        source_schema: impl Into<String>,
        target_schema: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            source_schema: source_schema.into(),
            target_schema: target_schema.into(),
        }
    }

    fn touches(&self, connection_id: &str) -> bool {
        self.source_id == connection_id || self.target_id == connection_id
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    diffs: Vec<TableDataDiff>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// TTL cache of data diffs.
#[derive(Debug)]
pub struct RowCountCache {
    ttl: Duration,
    entries: RwLock<HashMap<RowCountKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RowCountCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached diffs for `key`, unless expired.
    pub fn get(&self, key: &RowCountKey) -> Option<Vec<TableDataDiff>> {
        let hit = self
            .entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.diffs.clone());
        match &hit {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Store diffs for `key`.
    pub fn insert(&self, key: RowCountKey, diffs: Vec<TableDataDiff>) {
        trace!(source = %key.source_id, target = %key.target_id, "Caching row counts");
        let entry = CacheEntry {
            diffs,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().insert(key, entry);
    }

    /// Drop every entry involving `connection_id`. Returns how many went.
    pub fn invalidate_connection(&self, connection_id: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.touches(connection_id));
        before - entries.len()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }
}
