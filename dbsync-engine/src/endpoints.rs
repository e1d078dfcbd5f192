//! Source/target selection by connection id.

use dbsync_core::{ConnectionPool, InstanceGroup, SyncError, SyncResult};
use dbsync_data::ConnectionPair;
use dbsync_migrate::MigrationGenerator;
use serde::{Deserialize, Serialize};

/// Which connections and schemas an operation works on.
///
/// Missing schemas resolve per connection: the stored preference, then the
/// database name for MySQL/MariaDB, then the engine default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub source_connection_id: String,
    pub target_connection_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
}

impl Endpoints {
    /// Select two connections with default schemas.
    pub fn new(source_connection_id: impl Into<String>, target_connection_id: impl Into<String>) -> Self {
        Self {
            source_connection_id: source_connection_id.into(),
            target_connection_id: target_connection_id.into(),
            source_schema: None,
            target_schema: None,
        }
    }

    /// Source and one target of an instance group, with the group's schemas.
    pub fn for_group(group: &InstanceGroup, target_connection_id: impl Into<String>) -> Self {
        Self {
            source_connection_id: group.source_connection_id.clone(),
            target_connection_id: target_connection_id.into(),
            source_schema: group.source_schema.clone(),
            target_schema: group.target_schema.clone(),
        }
    }

    /// Set both schemas.
    pub fn schemas(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_schema = Some(source.into());
        self.target_schema = Some(target.into());
        self
    }

    /// Use the same schema name on both sides.
    pub fn schema(self, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        self.schemas(schema.clone(), schema)
    }

    /// Reject a target that is the source connection.
    pub fn ensure_distinct(&self) -> SyncResult<()> {
        if self.source_connection_id == self.target_connection_id {
            return Err(SyncError::validation(format!(
                "source and target are the same connection '{}'",
                self.source_connection_id
            )));
        }
        Ok(())
    }

    /// Acquire both connections and resolve schemas.
    pub async fn resolve(&self, pool: &ConnectionPool) -> SyncResult<ConnectionPair> {
        let source = pool.acquire(&self.source_connection_id).await?;
        let target = pool.acquire(&self.target_connection_id).await?;
        ConnectionPair::resolve(
            source,
            target,
            self.source_schema.as_deref(),
            self.target_schema.as_deref(),
        )
    }
}

/// Generator emitting DDL qualified with the pair's target schema.
pub(crate) fn generator_for(pair: &ConnectionPair) -> MigrationGenerator {
    MigrationGenerator::new().with_schema(pair.target_schema.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_distinct() {
        assert!(Endpoints::new("a", "a").ensure_distinct().is_err());
        assert!(Endpoints::new("a", "b").ensure_distinct().is_ok());
    }

    #[test]
    fn test_schema_sets_both_sides() {
        let endpoints = Endpoints::new("a", "b").schema("public");
        assert_eq!(endpoints.source_schema.as_deref(), Some("public"));
        assert_eq!(endpoints.target_schema.as_deref(), Some("public"));
    }

    #[test]
    fn test_for_group() {
        let group = InstanceGroup::new("g1", "fleet", "src")
            .target("t1")
            .schemas("app", "replica");
        let endpoints = Endpoints::for_group(&group, "t1");
        assert_eq!(endpoints, Endpoints::new("src", "t1").schemas("app", "replica"));
    }
}
