//! Connection, project and instance-group records.
//!
//! Credential storage is not dbsync's concern; a [`ConnectionRecord`] only
//! carries what the engine needs to identify and address a connection.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::connector::ConnectionInfo;
use crate::engine::Engine;
use crate::error::{SyncError, SyncResult};

/// A registered database connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub name: String,
    pub engine: Engine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database name, or file path for SQLite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Preferred schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl ConnectionRecord {
    /// Create a record.
    pub fn new(id: impl Into<String>, name: impl Into<String>, engine: Engine) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            engine,
            host: None,
            port: None,
            database: None,
            schema: None,
        }
    }

    /// Set host and port.
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Set the database (file path for SQLite).
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the preferred schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Identity used by connection handles.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            engine: self.engine,
            database: self.database.clone(),
            schema: self.schema.clone(),
        }
    }
}

/// A project grouping connections and instance groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// A designated source plus the targets kept in sync with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub source_connection_id: String,
    pub target_connection_ids: Vec<String>,
    /// Schema on the source; defaults per connection when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_schema: Option<String>,
    /// Schema on each target; defaults per connection when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
    #[serde(default = "default_true")]
    pub sync_schema: bool,
    #[serde(default = "default_true")]
    pub sync_data: bool,
}

fn default_true() -> bool {
    true
}

impl InstanceGroup {
    /// Create a group checking both schema and data.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source_connection_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            project_id: None,
            source_connection_id: source_connection_id.into(),
            target_connection_ids: Vec::new(),
            source_schema: None,
            target_schema: None,
            sync_schema: true,
            sync_data: true,
        }
    }

    /// Add a target connection.
    pub fn target(mut self, connection_id: impl Into<String>) -> Self {
        self.target_connection_ids.push(connection_id.into());
        self
    }

    /// Set the schemas compared on both sides.
    pub fn schemas(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_schema = Some(source.into());
        self.target_schema = Some(target.into());
        self
    }

    /// Choose which checks run.
    pub fn checks(mut self, sync_schema: bool, sync_data: bool) -> Self {
        self.sync_schema = sync_schema;
        self.sync_data = sync_data;
        self
    }

    /// Whether `connection_id` is one of this group's targets.
    pub fn has_target(&self, connection_id: &str) -> bool {
        self.target_connection_ids.iter().any(|t| t == connection_id)
    }

    /// Reject groups whose source is also a target.
    pub fn validate(&self) -> SyncResult<()> {
        if self.has_target(&self.source_connection_id) {
            return Err(SyncError::validation(format!(
                "group '{}' lists its source '{}' as a target",
                self.name, self.source_connection_id
            )));
        }
        Ok(())
    }
}

/// Read access to connection and group records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up a connection.
    async fn get_connection(&self, id: &str) -> SyncResult<Option<ConnectionRecord>>;

    /// All connections.
    async fn list_connections(&self) -> SyncResult<Vec<ConnectionRecord>>;

    /// Look up an instance group.
    async fn get_group(&self, id: &str) -> SyncResult<Option<InstanceGroup>>;

    /// All instance groups.
    async fn list_groups(&self) -> SyncResult<Vec<InstanceGroup>>;

    /// Look up a project.
    async fn get_project(&self, id: &str) -> SyncResult<Option<Project>>;

    /// Look up a connection or fail with `NotFound`.
    async fn require_connection(&self, id: &str) -> SyncResult<ConnectionRecord> {
        self.get_connection(id)
            .await?
            .ok_or_else(|| SyncError::not_found(format!("connection '{id}'")))
    }

    /// Look up a group or fail with `NotFound`.
    async fn require_group(&self, id: &str) -> SyncResult<InstanceGroup> {
        self.get_group(id)
            .await?
            .ok_or_else(|| SyncError::not_found(format!("instance group '{id}'")))
    }
}

/// Metadata held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    connections: RwLock<IndexMap<String, ConnectionRecord>>,
    groups: RwLock<IndexMap<String, InstanceGroup>>,
    projects: RwLock<IndexMap<String, Project>>,
}

impl InMemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a connection.
    pub fn put_connection(&self, record: ConnectionRecord) {
        self.connections.write().insert(record.id.clone(), record);
    }

    /// Remove a connection.
    pub fn remove_connection(&self, id: &str) -> Option<ConnectionRecord> {
        self.connections.write().shift_remove(id)
    }

    /// Insert or replace a group.
    pub fn put_group(&self, group: InstanceGroup) -> SyncResult<()> {
        group.validate()?;
        self.groups.write().insert(group.id.clone(), group);
        Ok(())
    }

    /// Remove a group.
    pub fn remove_group(&self, id: &str) -> Option<InstanceGroup> {
        self.groups.write().shift_remove(id)
    }

    /// Insert or replace a project.
    pub fn put_project(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_connection(&self, id: &str) -> SyncResult<Option<ConnectionRecord>> {
        Ok(self.connections.read().get(id).cloned())
    }

    async fn list_connections(&self) -> SyncResult<Vec<ConnectionRecord>> {
        Ok(self.connections.read().values().cloned().collect())
    }

    async fn get_group(&self, id: &str) -> SyncResult<Option<InstanceGroup>> {
        Ok(self.groups.read().get(id).cloned())
    }

    async fn list_groups(&self) -> SyncResult<Vec<InstanceGroup>> {
        Ok(self.groups.read().values().cloned().collect())
    }

    async fn get_project(&self, id: &str) -> SyncResult<Option<Project>> {
        Ok(self.projects.read().get(id).cloned())
    }
}
