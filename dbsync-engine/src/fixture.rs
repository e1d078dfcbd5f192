//! SQLite-backed pools for tests.

use std::sync::Arc;

use dbsync_core::{ConnectionPool, ConnectionRecord, Engine, InMemoryMetadataStore, InstanceGroup};
use dbsync_sqlite::SqliteConnectorFactory;
use tempfile::TempDir;

/// A pool of file databases in a temporary directory.
pub(crate) struct Fixture {
    _dir: TempDir,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub pool: Arc<ConnectionPool>,
}

impl Fixture {
    /// One SQLite file per id, each registered as a connection.
    pub fn new(ids: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let metadata = Arc::new(InMemoryMetadataStore::new());
        for id in ids {
            metadata.put_connection(
                ConnectionRecord::new(*id, format!("{id} db"), Engine::Sqlite)
                    .with_database(format!("{id}.db")),
            );
        }
        let factory = SqliteConnectorFactory::new().with_base_dir(dir.path());
        let pool = Arc::new(ConnectionPool::new(metadata.clone(), Arc::new(factory)));
        Self {
            _dir: dir,
            metadata,
            pool,
        }
    }

    /// Run statements on one connection.
    pub async fn exec(&self, id: &str, statements: &[&str]) {
        let handle = self.pool.acquire(id).await.unwrap();
        for sql in statements {
            handle.query(sql).await.unwrap();
        }
    }

    /// `COUNT(*)` of a table.
    pub async fn count(&self, id: &str, table: &str) -> i64 {
        let handle = self.pool.acquire(id).await.unwrap();
        let result = handle
            .query(&format!("SELECT COUNT(*) AS n FROM \"{table}\""))
            .await
            .unwrap();
        result.scalar_i64().unwrap()
    }

    /// Register a group.
    pub fn group(&self, group: InstanceGroup) -> InstanceGroup {
        self.metadata.put_group(group.clone()).unwrap();
        group
    }
}

pub(crate) const USERS: &str =
    "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)";
pub(crate) const USERS_NO_EMAIL: &str =
    "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)";
pub(crate) const POSTS: &str = "CREATE TABLE posts (id INTEGER PRIMARY KEY, \
     user_id INTEGER NOT NULL REFERENCES users (id), title TEXT)";
pub(crate) const SEED_USERS: &str =
    "INSERT INTO users (id, name, email) VALUES (1, 'ada', 'ada@example.com'), (2, 'bob', NULL)";
