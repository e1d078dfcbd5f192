//! Shared setup for integration tests: file-backed SQLite connections in a
//! temporary directory, wired into a pool and a service.

#![allow(dead_code)]

use std::sync::Arc;

use dbsync::prelude::*;
use tempfile::TempDir;

pub struct Env {
    _dir: TempDir,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub pool: Arc<ConnectionPool>,
    pub service: SyncService,
}

impl Env {
    pub fn new(ids: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata = Arc::new(InMemoryMetadataStore::new());
        for id in ids {
            metadata.put_connection(
                ConnectionRecord::new(*id, id.to_uppercase(), Engine::Sqlite)
                    .with_database(format!("{id}.db")),
            );
        }
        let factory = SqliteConnectorFactory::new().with_base_dir(dir.path());
        let pool = Arc::new(ConnectionPool::new(metadata.clone(), Arc::new(factory)));
        let service = SyncService::new(pool.clone(), Arc::new(InMemoryHistory::new()));
        Self {
            _dir: dir,
            metadata,
            pool,
            service,
        }
    }

    pub async fn exec(&self, id: &str, statements: &[&str]) {
        let handle = self.pool.acquire(id).await.expect("acquire");
        for sql in statements {
            handle.query(sql).await.unwrap_or_else(|e| panic!("{sql}: {e}"));
        }
    }

    pub async fn rows(&self, id: &str, sql: &str) -> Vec<serde_json::Value> {
        let handle = self.pool.acquire(id).await.expect("acquire");
        let result = handle.query(sql).await.expect("query");
        result.rows.into_iter().map(serde_json::Value::Object).collect()
    }
}
