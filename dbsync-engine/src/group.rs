//! Instance group status checks.
//!
//! Every target of a group is compared with the group's source. Targets are
//! checked concurrently, at most `max_concurrent_targets` at a time, and
//! results come back in the group's target order. A failing target is
//! reported with status `error`; it never hides the others.

use std::sync::Arc;

use dbsync_core::{ConnectionPool, EngineSettings, InstanceGroup, SyncError, SyncResult};
use dbsync_data::{TableDataDiff, compute_table_diffs, summarize};
use dbsync_migrate::{SchemaDiff, SchemaDiffer, SchemaIntrospector};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::endpoints::{Endpoints, generator_for};

/// Result of one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    InSync,
    OutOfSync,
    Error,
    /// Not run, either disabled for the group or not reached.
    #[default]
    Unchecked,
}

/// Schema and data status of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupTargetStatus {
    pub connection_id: String,
    pub connection_name: String,
    pub schema_status: TargetStatus,
    pub schema_diff_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_diff: Option<SchemaDiff>,
    /// Statements that would bring the target in line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_sql: Option<Vec<String>>,
    pub data_status: TargetStatus,
    pub data_diff_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_diff: Option<Vec<TableDataDiff>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceGroupTargetStatus {
    /// A status with nothing checked yet.
    pub fn unchecked(connection_id: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            connection_name: connection_name.into(),
            schema_status: TargetStatus::Unchecked,
            schema_diff_count: 0,
            schema_diff: None,
            migration_sql: None,
            data_status: TargetStatus::Unchecked,
            data_diff_summary: String::new(),
            data_diff: None,
            error: None,
        }
    }

    /// Mark every enabled check as failed.
    fn fail(&mut self, group: &InstanceGroup, error: &SyncError) {
        if group.sync_schema {
            self.schema_status = TargetStatus::Error;
        }
        if group.sync_data {
            self.data_status = TargetStatus::Error;
        }
        self.error = Some(error.to_string());
    }

    /// Both enabled checks passed.
    pub fn is_in_sync(&self) -> bool {
        !matches!(self.schema_status, TargetStatus::OutOfSync | TargetStatus::Error)
            && !matches!(self.data_status, TargetStatus::OutOfSync | TargetStatus::Error)
    }
}

/// Status of every target of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSyncStatus {
    pub group_id: String,
    pub group_name: String,
    pub source_connection_id: String,
    pub targets: Vec<InstanceGroupTargetStatus>,
}

impl GroupSyncStatus {
    /// Number of targets fully in sync.
    pub fn in_sync_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_in_sync()).count()
    }
}

/// Runs group checks against pooled connections.
#[derive(Debug, Clone)]
pub struct GroupOrchestrator {
    pool: Arc<ConnectionPool>,
    introspector: SchemaIntrospector,
    max_concurrent_targets: usize,
}

impl GroupOrchestrator {
    /// Create an orchestrator.
    pub fn new(pool: Arc<ConnectionPool>, settings: &EngineSettings) -> Self {
        Self {
            pool,
            introspector: SchemaIntrospector::new(),
            max_concurrent_targets: settings.max_concurrent_targets.max(1),
        }
    }

    /// Use a specific introspector.
    pub fn with_introspector(mut self, introspector: SchemaIntrospector) -> Self {
        self.introspector = introspector;
        self
    }

    /// Check every target of `group`.
    pub async fn check_group(&self, group: &InstanceGroup) -> SyncResult<GroupSyncStatus> {
        group.validate()?;
        info!(
            group = %group.id,
            targets = group.target_connection_ids.len(),
            concurrency = self.max_concurrent_targets,
            "Checking instance group"
        );

        let targets: Vec<InstanceGroupTargetStatus> = stream::iter(&group.target_connection_ids)
            .map(|id| self.check_target_unchecked(group, id))
            .buffered(self.max_concurrent_targets)
            .collect()
            .await;

        let status = GroupSyncStatus {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            source_connection_id: group.source_connection_id.clone(),
            targets,
        };
        info!(
            group = %group.id,
            in_sync = status.in_sync_count(),
            targets = status.targets.len(),
            "Instance group checked"
        );
        Ok(status)
    }

    /// Check one target of `group`.
    pub async fn check_target(
        &self,
        group: &InstanceGroup,
        connection_id: &str,
    ) -> SyncResult<InstanceGroupTargetStatus> {
        if !group.has_target(connection_id) {
            return Err(SyncError::validation(format!(
                "connection '{}' is not a target of group '{}'",
                connection_id, group.name
            )));
        }
        Ok(self.check_target_unchecked(group, connection_id).await)
    }

    async fn check_target_unchecked(
        &self,
        group: &InstanceGroup,
        connection_id: &str,
    ) -> InstanceGroupTargetStatus {
        let name = match self.pool.metadata().get_connection(connection_id).await {
            Ok(Some(record)) => record.name,
            _ => connection_id.to_string(),
        };
        let mut status = InstanceGroupTargetStatus::unchecked(connection_id, name);
        if !group.sync_schema && !group.sync_data {
            return status;
        }

        if let Err(e) = self.run_checks(group, connection_id, &mut status).await {
            warn!(group = %group.id, target = %connection_id, error = %e, "Target check failed");
            status.fail(group, &e);
        }
        status
    }

    async fn run_checks(
        &self,
        group: &InstanceGroup,
        connection_id: &str,
        status: &mut InstanceGroupTargetStatus,
    ) -> SyncResult<()> {
        let endpoints = Endpoints::for_group(group, connection_id);
        endpoints.ensure_distinct()?;
        let pair = endpoints.resolve(&self.pool).await?;

        // Source and target are separate connections; read both at once.
        let (source, target) = tokio::join!(
            self.introspector.introspect(&pair.source, Some(&pair.source_schema)),
            self.introspector.introspect(&pair.target, Some(&pair.target_schema))
        );
        let (source, target) = (source?, target?);

        if group.sync_schema {
            let diff = SchemaDiffer::new().diff(&source, &target);
            status.schema_diff_count = diff.len();
            if diff.is_empty() {
                status.schema_status = TargetStatus::InSync;
            } else {
                status.schema_status = TargetStatus::OutOfSync;
                status.migration_sql = Some(generator_for(&pair).generate(&diff, pair.target.engine()));
                status.schema_diff = Some(diff);
            }
        }

        if group.sync_data {
            match compute_table_diffs(&pair, &source, &target).await {
                Ok(diffs) => {
                    status.data_status = if diffs.iter().all(TableDataDiff::is_in_sync) {
                        TargetStatus::InSync
                    } else {
                        TargetStatus::OutOfSync
                    };
                    status.data_diff_summary = summarize(&diffs);
                    status.data_diff = Some(diffs);
                }
                Err(e) => {
                    status.data_status = TargetStatus::Error;
                    status.error = Some(e.to_string());
                }
            }
        }

        debug!(
            target = %connection_id,
            schema = ?status.schema_status,
            data = ?status.data_status,
            "Target checked"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Fixture, SEED_USERS, USERS, USERS_NO_EMAIL};
    use pretty_assertions::assert_eq;

    async fn fleet() -> (Fixture, InstanceGroup) {
        let fx = Fixture::new(&["src", "t1", "t2"]);
        fx.exec("src", &[USERS, SEED_USERS]).await;
        fx.exec("t1", &[USERS, SEED_USERS]).await;
        fx.exec("t2", &[USERS_NO_EMAIL]).await;
        let group = fx.group(
            InstanceGroup::new("g1", "fleet", "src")
                .target("t1")
                .target("t2")
                .target("ghost"),
        );
        (fx, group)
    }

    #[tokio::test]
    async fn test_check_group_reports_every_target_in_order() {
        let (fx, group) = fleet().await;
        let orchestrator = GroupOrchestrator::new(fx.pool.clone(), &EngineSettings::default());

        let status = orchestrator.check_group(&group).await.unwrap();
        let ids: Vec<&str> = status.targets.iter().map(|t| t.connection_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "ghost"]);
        assert_eq!(status.in_sync_count(), 1);

        let t1 = &status.targets[0];
        assert_eq!(t1.connection_name, "t1 db");
        assert_eq!(t1.schema_status, TargetStatus::InSync);
        assert_eq!(t1.data_status, TargetStatus::InSync);
        assert!(t1.migration_sql.is_none());

        let t2 = &status.targets[1];
        assert_eq!(t2.schema_status, TargetStatus::OutOfSync);
        assert_eq!(t2.schema_diff_count, 2);
        let sql = t2.migration_sql.as_ref().unwrap();
        assert!(sql.iter().any(|s| s.contains("ADD COLUMN \"email\"")));
        assert_eq!(t2.data_status, TargetStatus::OutOfSync);
        let diffs = t2.data_diff.as_ref().unwrap();
        assert_eq!(diffs[0].missing_in_target, Some(2));

        let ghost = &status.targets[2];
        assert_eq!(ghost.connection_name, "ghost");
        assert_eq!(ghost.schema_status, TargetStatus::Error);
        assert_eq!(ghost.data_status, TargetStatus::Error);
        assert!(ghost.error.as_deref().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_concurrency_of_one_gives_the_same_result() {
        let (fx, group) = fleet().await;
        let settings = EngineSettings {
            max_concurrent_targets: 1,
            ..EngineSettings::default()
        };
        let serial = GroupOrchestrator::new(fx.pool.clone(), &settings)
            .check_group(&group)
            .await
            .unwrap();
        let parallel = GroupOrchestrator::new(fx.pool.clone(), &EngineSettings::default())
            .check_group(&group)
            .await
            .unwrap();
        assert_eq!(serial, parallel);
    }

    #[tokio::test]
    async fn test_disabled_checks_stay_unchecked() {
        let (fx, group) = fleet().await;
        let orchestrator = GroupOrchestrator::new(fx.pool.clone(), &EngineSettings::default());

        let schema_only = group.clone().checks(true, false);
        let status = orchestrator.check_target(&schema_only, "t2").await.unwrap();
        assert_eq!(status.schema_status, TargetStatus::OutOfSync);
        assert_eq!(status.data_status, TargetStatus::Unchecked);
        assert!(status.data_diff.is_none());

        let nothing = group.checks(false, false);
        let status = orchestrator.check_target(&nothing, "ghost").await.unwrap();
        assert_eq!(status, InstanceGroupTargetStatus::unchecked("ghost", "ghost"));
    }

    #[tokio::test]
    async fn test_check_target_rejects_non_members() {
        let (fx, group) = fleet().await;
        let orchestrator = GroupOrchestrator::new(fx.pool.clone(), &EngineSettings::default());
        let err = orchestrator.check_target(&group, "src").await.unwrap_err();
        assert_eq!(err.kind(), dbsync_core::ErrorKind::Validation);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_value(TargetStatus::OutOfSync).unwrap();
        assert_eq!(json, serde_json::json!("out_of_sync"));
    }
}
