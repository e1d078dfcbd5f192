//! The dbsync service facade.
//!
//! [`SyncService`] is what a UI, CLI or API layer talks to. It owns the
//! connection pool, the migration history and the row-count cache, and turns
//! connection ids into the pairs the migrate and data crates work on.

use std::sync::Arc;
use std::time::Duration;

use dbsync_core::{
    ConnectionPool, ConnectionTestResult, Engine, Schema, SyncConfig, SyncError, SyncResult,
};
use dbsync_data::{
    BatchSyncReport, ConnectionPair, DumpOptions, DumpRestoreResult, SyncOptions, TableDataDiff,
    TableSyncResult, compute_table_diffs, sync_table, sync_tables,
};
use dbsync_migrate::{
    IntrospectionOptions, MigrationFilter, MigrationGenerator, MigrationHistoryRepository,
    MigrationRecord, SchemaDiff, SchemaDiffer, SchemaIntrospector,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, RowCountCache, RowCountKey};
use crate::endpoints::{Endpoints, generator_for};
use crate::group::{GroupOrchestrator, GroupSyncStatus, InstanceGroupTargetStatus};

/// A request to migrate a target to its source's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    #[serde(flatten)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub description: String,
    /// Instance group to tag the record with. Not checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl MigrationRequest {
    /// Create a request.
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            description: String::new(),
            group_id: None,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Tag with an instance group.
    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// Schema and data synchronization service.
pub struct SyncService {
    pool: Arc<ConnectionPool>,
    history: Arc<dyn MigrationHistoryRepository>,
    config: SyncConfig,
    introspector: SchemaIntrospector,
    row_counts: RowCountCache,
    orchestrator: GroupOrchestrator,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .field("row_counts", &self.row_counts.stats())
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Create a service with default configuration.
    pub fn new(pool: Arc<ConnectionPool>, history: Arc<dyn MigrationHistoryRepository>) -> Self {
        Self::with_config(pool, history, SyncConfig::default())
    }

    /// Create a service.
    pub fn with_config(
        pool: Arc<ConnectionPool>,
        history: Arc<dyn MigrationHistoryRepository>,
        config: SyncConfig,
    ) -> Self {
        let row_counts =
            RowCountCache::new(Duration::from_secs(config.engine.row_count_cache_ttl_secs));
        let orchestrator = GroupOrchestrator::new(pool.clone(), &config.engine);
        Self {
            pool,
            history,
            config,
            introspector: SchemaIntrospector::new(),
            row_counts,
            orchestrator,
        }
    }

    /// Use specific introspection options everywhere.
    pub fn with_introspection(mut self, options: IntrospectionOptions) -> Self {
        self.introspector = SchemaIntrospector::with_options(options.clone());
        self.orchestrator = self
            .orchestrator
            .with_introspector(SchemaIntrospector::with_options(options));
        self
    }

    /// Prepare the history store.
    pub async fn initialize(&self) -> SyncResult<()> {
        self.history.initialize().await
    }

    /// The connection pool.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Schema
    // ---------------------------------------------------------------------

    /// Schemas visible through a connection.
    pub async fn get_schemas(&self, connection_id: &str) -> SyncResult<Vec<String>> {
        let conn = self.pool.acquire(connection_id).await?;
        self.introspector.list_schemas(&conn).await
    }

    /// Read one schema of a connection.
    pub async fn introspect(
        &self,
        connection_id: &str,
        schema: Option<&str>,
    ) -> SyncResult<Schema> {
        let conn = self.pool.acquire(connection_id).await?;
        self.introspector.introspect(&conn, schema).await
    }

    /// Diff the target's schema against the source's.
    #[instrument(skip(self), fields(source = %endpoints.source_connection_id, target = %endpoints.target_connection_id))]
    pub async fn compare_schemas(&self, endpoints: &Endpoints) -> SyncResult<SchemaDiff> {
        let pair = endpoints.resolve(&self.pool).await?;
        let (source, target) = self.snapshots(&pair).await?;
        let diff = SchemaDiffer::new().diff(&source, &target);
        info!(changes = diff.len(), "Schemas compared");
        Ok(diff)
    }

    /// Migration DDL for `diff`, unqualified.
    pub fn generate_migration(&self, diff: &SchemaDiff, target: Engine) -> Vec<String> {
        MigrationGenerator::new().generate(diff, target)
    }

    /// Bring the target's schema in line with the source's and record it.
    ///
    /// Statements run on one target session. On engines with transactional
    /// DDL they run in a transaction that is rolled back on the first
    /// failure; the error names the failing statement and nothing is
    /// recorded. Elsewhere the statements that ran before the failure stay
    /// in effect: they are recorded as a partial migration and returned in
    /// [`SyncError::PartialMigration`].
    #[instrument(skip(self, request), fields(source = %request.endpoints.source_connection_id, target = %request.endpoints.target_connection_id))]
    pub async fn apply_migration(&self, request: &MigrationRequest) -> SyncResult<MigrationRecord> {
        request.endpoints.ensure_distinct()?;
        let pair = request.endpoints.resolve(&self.pool).await?;
        let (source, target) = self.snapshots(&pair).await?;
        let diff = SchemaDiffer::new().diff(&source, &target);
        let statements = generator_for(&pair).generate(&diff, pair.target.engine());

        if !statements.is_empty() {
            if let Err(failure) = execute_migration(&pair, &statements).await {
                return Err(self.partial_failure(&pair, request, &statements, failure).await);
            }
            self.row_counts
                .invalidate_connection(&request.endpoints.target_connection_id);
        }
        info!(statements = statements.len(), "Migration applied");

        let record = new_record(&pair, request, statements);
        self.history.record(&record).await?;
        self.resolve_group_name(record).await
    }

    /// Turn a failed run into an error, recording what stayed applied.
    async fn partial_failure(
        &self,
        pair: &ConnectionPair,
        request: &MigrationRequest,
        statements: &[String],
        failure: MigrationFailure,
    ) -> SyncError {
        if failure.applied == 0 {
            return failure.error;
        }
        self.row_counts
            .invalidate_connection(&request.endpoints.target_connection_id);
        let applied = statements[..failure.applied].to_vec();
        let record = new_record(pair, request, applied.clone()).partially_applied();
        let record_id = match self.history.record(&record).await {
            Ok(()) => Some(record.id),
            Err(e) => {
                warn!(error = %e, "Could not record partial migration");
                None
            }
        };
        SyncError::PartialMigration {
            applied,
            total: statements.len(),
            record_id,
            source: Box::new(failure.error),
        }
    }

    /// Record a migration that was generated but not applied.
    pub async fn save_migration(
        &self,
        request: &MigrationRequest,
        statements: Vec<String>,
    ) -> SyncResult<MigrationRecord> {
        let pair = request.endpoints.resolve(&self.pool).await?;
        let record = new_record(&pair, request, statements);
        self.history.record(&record).await?;
        self.resolve_group_name(record).await
    }

    // ---------------------------------------------------------------------
    // Migration history
    // ---------------------------------------------------------------------

    /// History records, newest first, with group names resolved.
    pub async fn list_migrations(&self, filter: &MigrationFilter) -> SyncResult<Vec<MigrationRecord>> {
        let records = self.history.list(filter).await?;
        let mut resolved = Vec::with_capacity(records.len());
        for record in records {
            resolved.push(self.resolve_group_name(record).await?);
        }
        Ok(resolved)
    }

    /// One history record.
    pub async fn get_migration(&self, id: &str) -> SyncResult<Option<MigrationRecord>> {
        match self.history.get(id).await? {
            Some(record) => Ok(Some(self.resolve_group_name(record).await?)),
            None => Ok(None),
        }
    }

    /// Delete a history record. Returns whether it existed.
    pub async fn delete_migration(&self, id: &str) -> SyncResult<bool> {
        let deleted = self.history.delete(id).await?;
        debug!(id = %id, deleted, "Migration record deleted");
        Ok(deleted)
    }

    async fn resolve_group_name(&self, mut record: MigrationRecord) -> SyncResult<MigrationRecord> {
        record.group_name = match &record.group_id {
            Some(id) => self.pool.metadata().get_group(id).await?.map(|g| g.name),
            None => None,
        };
        Ok(record)
    }

    // ---------------------------------------------------------------------
    // Data
    // ---------------------------------------------------------------------

    /// Row-count and key-presence diff of every shared table, cached.
    pub async fn get_table_row_counts(&self, endpoints: &Endpoints) -> SyncResult<Vec<TableDataDiff>> {
        let pair = endpoints.resolve(&self.pool).await?;
        let key = RowCountKey::new(
            pair.source.id(),
            pair.target.id(),
            &pair.source_schema,
            &pair.target_schema,
        );
        if let Some(diffs) = self.row_counts.get(&key) {
            debug!(source = %key.source_id, target = %key.target_id, "Row counts from cache");
            return Ok(diffs);
        }

        let (source, target) = self.snapshots(&pair).await?;
        let diffs = compute_table_diffs(&pair, &source, &target).await?;
        self.row_counts.insert(key, diffs.clone());
        Ok(diffs)
    }

    /// Forget cached row counts involving a connection.
    pub fn invalidate_row_counts(&self, connection_id: &str) -> usize {
        self.row_counts.invalidate_connection(connection_id)
    }

    /// Row-count cache statistics.
    pub fn row_count_stats(&self) -> CacheStats {
        self.row_counts.stats()
    }

    /// Reconcile one table. Errors are reported in the result.
    #[instrument(skip(self, options), fields(source = %endpoints.source_connection_id, target = %endpoints.target_connection_id))]
    pub async fn sync_table_data(
        &self,
        endpoints: &Endpoints,
        table: &str,
        options: Option<&SyncOptions>,
    ) -> TableSyncResult {
        let options = options.cloned().unwrap_or_else(|| SyncOptions::from(&self.config.sync));
        let outcome = async {
            endpoints.ensure_distinct()?;
            let pair = endpoints.resolve(&self.pool).await?;
            let source = self.table_snapshot(&pair, table).await?;
            let Some(definition) = source.table(table) else {
                return Err(SyncError::not_found(format!(
                    "table '{}' not found in schema '{}'",
                    table, pair.source_schema
                )));
            };
            Ok::<_, SyncError>(
                sync_table(&pair, definition, &definition.primary_key(), &options).await,
            )
        }
        .await;

        self.row_counts
            .invalidate_connection(&endpoints.target_connection_id);
        outcome.unwrap_or_else(|e| {
            warn!(table = %table, error = %e, "Table sync failed");
            TableSyncResult::failed(table, &e)
        })
    }

    /// Reconcile several tables in dependency order. An empty `tables`
    /// selects every table present on both sides.
    #[instrument(skip(self, tables, options), fields(source = %endpoints.source_connection_id, target = %endpoints.target_connection_id))]
    pub async fn sync_tables_data(
        &self,
        endpoints: &Endpoints,
        tables: &[String],
        options: Option<&SyncOptions>,
    ) -> BatchSyncReport {
        let options = options.cloned().unwrap_or_else(|| SyncOptions::from(&self.config.sync));
        let outcome = async {
            endpoints.ensure_distinct()?;
            let pair = endpoints.resolve(&self.pool).await?;
            let (source, target) = self.snapshots(&pair).await?;
            let selected: Vec<String> = if tables.is_empty() {
                source
                    .tables
                    .iter()
                    .filter(|t| target.table(&t.name).is_some())
                    .map(|t| t.name.clone())
                    .collect()
            } else {
                tables.to_vec()
            };
            Ok::<_, SyncError>(sync_tables(&pair, &source, &selected, &options).await)
        }
        .await;

        self.row_counts
            .invalidate_connection(&endpoints.target_connection_id);
        outcome.unwrap_or_else(|e| {
            warn!(error = %e, "Batch sync failed");
            let mut report = BatchSyncReport::from_results(
                tables.iter().map(|t| TableSyncResult::failed(t, &e)).collect(),
            );
            report.record_error(&e);
            report
        })
    }

    /// Replace the target's rows with the source's.
    ///
    /// Only validation problems are returned as `Err`; an unreachable side
    /// yields a failed result carrying the error.
    #[instrument(skip(self, options), fields(source = %endpoints.source_connection_id, target = %endpoints.target_connection_id))]
    pub async fn dump_and_restore(
        &self,
        endpoints: &Endpoints,
        options: Option<&DumpOptions>,
    ) -> SyncResult<DumpRestoreResult> {
        let options = options.cloned().unwrap_or_else(|| DumpOptions::from(&self.config.dump));
        endpoints.ensure_distinct()?;
        let snapshots = async {
            let pair = endpoints.resolve(&self.pool).await?;
            let (source, target) = self.snapshots(&pair).await?;
            Ok::<_, SyncError>((pair, source, target))
        }
        .await;
        let (pair, source, target) = match snapshots {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "Reload could not start");
                return Ok(DumpRestoreResult::aborted(&e));
            }
        };
        let result = dbsync_data::dump_and_restore(&pair, &source, &target, &options).await;
        self.row_counts
            .invalidate_connection(&endpoints.target_connection_id);
        result
    }

    // ---------------------------------------------------------------------
    // Connections and groups
    // ---------------------------------------------------------------------

    /// Check a connection.
    pub async fn test_connection(&self, connection_id: &str) -> SyncResult<ConnectionTestResult> {
        let conn = self.pool.acquire(connection_id).await?;
        Ok(conn.test_connection().await)
    }

    /// Check every target of a group.
    pub async fn get_group_sync_status(&self, group_id: &str) -> SyncResult<GroupSyncStatus> {
        let group = self.pool.metadata().require_group(group_id).await?;
        self.orchestrator.check_group(&group).await
    }

    /// Check one target of a group.
    pub async fn check_single_target_status(
        &self,
        group_id: &str,
        connection_id: &str,
    ) -> SyncResult<InstanceGroupTargetStatus> {
        let group = self.pool.metadata().require_group(group_id).await?;
        self.orchestrator.check_target(&group, connection_id).await
    }

    /// Disconnect every pooled connection.
    pub async fn shutdown(&self) {
        self.pool.close_all().await;
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    async fn snapshots(&self, pair: &ConnectionPair) -> SyncResult<(Schema, Schema)> {
        let (source, target) = tokio::join!(
            self.introspector.introspect(&pair.source, Some(&pair.source_schema)),
            self.introspector.introspect(&pair.target, Some(&pair.target_schema))
        );
        Ok((source?, target?))
    }

    /// Source snapshot holding only `table`.
    async fn table_snapshot(&self, pair: &ConnectionPair, table: &str) -> SyncResult<Schema> {
        let options = self
            .introspector
            .options()
            .clone()
            .include_tables(vec![table.to_string()]);
        SchemaIntrospector::with_options(options)
            .introspect(&pair.source, Some(&pair.source_schema))
            .await
    }
}

fn new_record(
    pair: &ConnectionPair,
    request: &MigrationRequest,
    statements: Vec<String>,
) -> MigrationRecord {
    MigrationRecord::new(
        pair.source.id(),
        pair.target.id(),
        &pair.source_schema,
        &pair.target_schema,
        statements,
    )
    .with_description(&request.description)
    .with_group(request.group_id.clone())
}

/// A migration that did not complete.
#[derive(Debug)]
struct MigrationFailure {
    error: SyncError,
    /// Leading statements left in effect.
    applied: usize,
}

impl From<SyncError> for MigrationFailure {
    fn from(error: SyncError) -> Self {
        Self { error, applied: 0 }
    }
}

/// Run migration statements on one target session.
async fn execute_migration(
    pair: &ConnectionPair,
    statements: &[String],
) -> Result<(), MigrationFailure> {
    let mut session = pair.target.session().await?;
    let dialect = session.dialect();

    // SQLite ignores the pragma inside a transaction; switch it first.
    let checks_disabled = match dialect.disable_fk_checks() {
        Some(sql) => {
            session.query(sql).await?;
            true
        }
        None => false,
    };
    let transactional = dialect.supports_transactional_ddl();
    if transactional {
        session.query(dialect.begin_transaction()).await?;
    }

    let mut failure = None;
    for (index, sql) in statements.iter().enumerate() {
        if let Err(error) = session.query(sql).await {
            failure = Some(MigrationFailure {
                error,
                applied: index,
            });
            break;
        }
    }

    let outcome = match failure {
        None if transactional => session
            .query(dialect.commit_transaction())
            .await
            .map(|_| ())
            .map_err(MigrationFailure::from),
        None => Ok(()),
        Some(mut failure) => {
            warn!(
                target = %pair.target.id(),
                applied = failure.applied,
                error = %failure.error,
                "Migration failed"
            );
            if transactional {
                failure.applied = 0;
                if let Err(rollback) = session.query(dialect.rollback_transaction()).await {
                    warn!(target = %pair.target.id(), error = %rollback, "Rollback failed");
                }
            }
            Err(failure)
        }
    };

    if checks_disabled
        && let Some(sql) = dialect.enable_fk_checks()
        && let Err(e) = session.query(sql).await
    {
        warn!(target = %pair.target.id(), error = %e, "Could not re-enable foreign key checks");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{Fixture, POSTS, SEED_USERS, USERS, USERS_NO_EMAIL};
    use dbsync_core::testing::MockConnector;
    use dbsync_core::{ConnectionRecord, ErrorKind, InstanceGroup};
    use dbsync_data::SyncOutcome;
    use dbsync_migrate::InMemoryHistory;
    use pretty_assertions::assert_eq;

    fn service(fx: &Fixture) -> (SyncService, Arc<InMemoryHistory>) {
        let history = Arc::new(InMemoryHistory::new());
        (SyncService::new(fx.pool.clone(), history.clone()), history)
    }

    #[tokio::test]
    async fn test_apply_migration_converges_and_records() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec("src", &[USERS, POSTS]).await;
        fx.exec("dst", &[USERS_NO_EMAIL]).await;
        let (svc, history) = service(&fx);
        let endpoints = Endpoints::new("src", "dst");

        let before = svc.compare_schemas(&endpoints).await.unwrap();
        assert!(!before.is_empty());

        let request = MigrationRequest::new(endpoints.clone()).description("add posts");
        let record = svc.apply_migration(&request).await.unwrap();
        assert_eq!(record.description, "add posts");
        assert_eq!(record.target_schema, "main");
        assert!(record.sql_statements.iter().any(|s| s.contains("CREATE TABLE")));
        assert_eq!(history.len(), 1);

        let after = svc.compare_schemas(&endpoints).await.unwrap();
        assert!(after.is_empty(), "{}", after.summary());
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec(
            "src",
            &[
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT NOT NULL)",
                "CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT)",
            ],
        )
        .await;
        fx.exec("dst", &[USERS_NO_EMAIL, "INSERT INTO users VALUES (1, 'ada')"])
            .await;
        let (svc, history) = service(&fx);

        let request = MigrationRequest::new(Endpoints::new("src", "dst"));
        let err = svc.apply_migration(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(matches!(err, SyncError::Execution { statement: Some(_), .. }));
        assert!(history.is_empty());

        let target = svc.introspect("dst", None).await.unwrap();
        assert!(target.table("tags").is_none());
        assert_eq!(fx.count("dst", "users").await, 1);
    }

    #[tokio::test]
    async fn test_non_transactional_failure_records_applied_statements() {
        let fx = Fixture::new(&["src"]);
        fx.exec("src", &[USERS, POSTS]).await;
        let target = MockConnector::new(Engine::MySql)
            .respond_rows(
                "information_schema.schemata",
                vec![serde_json::json!({"schema_name": "shop"})],
            )
            .fail_on("CREATE TABLE `shop`.`posts`", "table is locked");
        let log = target.log();
        let record = ConnectionRecord::new("my", "warehouse", Engine::MySql).with_database("shop");
        fx.pool.register(&record, Box::new(target));
        let (svc, history) = service(&fx);

        let request = MigrationRequest::new(Endpoints::new("src", "my")).description("catch up");
        let err = svc.apply_migration(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        let SyncError::PartialMigration {
            applied,
            total,
            record_id,
            ..
        } = &err
        else {
            panic!("expected a partial migration, got {err}");
        };
        assert_eq!(applied.len(), 1);
        assert!(applied[0].starts_with("CREATE TABLE `shop`.`users`"));
        assert!(*total > 2);
        assert!(err.statement().is_some_and(|s| s.contains("`posts`")));
        assert_eq!(log.count("ROLLBACK"), 0);
        assert_eq!(
            log.statements().last().map(String::as_str),
            Some("SET FOREIGN_KEY_CHECKS = 1")
        );

        assert_eq!(history.len(), 1);
        let stored = svc
            .get_migration(record_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.partial);
        assert_eq!(&stored.sql_statements, applied);
        assert_eq!(stored.description, "catch up");
    }

    #[tokio::test]
    async fn test_same_connection_is_rejected() {
        let fx = Fixture::new(&["src"]);
        let (svc, _) = service(&fx);
        let request = MigrationRequest::new(Endpoints::new("src", "src"));
        let err = svc.apply_migration(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let result = svc
            .sync_table_data(&Endpoints::new("src", "src"), "users", None)
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_group_names_resolve_at_read_time() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec("src", &[USERS]).await;
        fx.exec("dst", &[USERS]).await;
        fx.group(InstanceGroup::new("g1", "fleet", "src").target("dst"));
        let (svc, _) = service(&fx);

        let tagged = svc
            .apply_migration(&MigrationRequest::new(Endpoints::new("src", "dst")).group("g1"))
            .await
            .unwrap();
        assert_eq!(tagged.group_name.as_deref(), Some("fleet"));
        assert!(tagged.sql_statements.is_empty());

        let dangling = svc
            .apply_migration(&MigrationRequest::new(Endpoints::new("src", "dst")).group("nonexistent"))
            .await
            .unwrap();
        assert_eq!(dangling.group_id.as_deref(), Some("nonexistent"));
        assert_eq!(dangling.group_name, None);

        fx.metadata.remove_group("g1");
        let stored = svc.get_migration(&tagged.id).await.unwrap().unwrap();
        assert_eq!(stored.group_id.as_deref(), Some("g1"));
        assert_eq!(stored.group_name, None);

        let listed = svc
            .list_migrations(&MigrationFilter::new().group("nonexistent"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        assert!(svc.delete_migration(&dangling.id).await.unwrap());
        assert!(!svc.delete_migration(&dangling.id).await.unwrap());
        assert!(svc.get_migration(&dangling.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_row_counts_are_cached_until_a_write() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec("src", &[USERS, SEED_USERS]).await;
        fx.exec("dst", &[USERS]).await;
        let (svc, _) = service(&fx);
        let endpoints = Endpoints::new("src", "dst");

        let first = svc.get_table_row_counts(&endpoints).await.unwrap();
        assert_eq!(first[0].missing_in_target, Some(2));

        // Writes behind the service's back are not seen until invalidation.
        fx.exec("dst", &[SEED_USERS]).await;
        let cached = svc.get_table_row_counts(&endpoints).await.unwrap();
        assert_eq!(cached, first);
        assert_eq!(svc.row_count_stats().hits, 1);

        assert_eq!(svc.invalidate_row_counts("dst"), 1);
        let fresh = svc.get_table_row_counts(&endpoints).await.unwrap();
        assert!(fresh[0].is_in_sync());
    }

    #[tokio::test]
    async fn test_sync_table_data() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec(
            "src",
            &[USERS, "INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b')"],
        )
        .await;
        fx.exec(
            "dst",
            &[USERS, "INSERT INTO users (id, name) VALUES (1, 'a'), (3, 'c')"],
        )
        .await;
        let (svc, _) = service(&fx);
        let endpoints = Endpoints::new("src", "dst");

        let result = svc
            .sync_table_data(&endpoints, "users", Some(&SyncOptions::all()))
            .await;
        assert_eq!((result.inserted, result.updated, result.deleted), (1, 0, 1));
        assert!(result.errors.is_empty());

        let diffs = svc.get_table_row_counts(&endpoints).await.unwrap();
        assert!(diffs.iter().all(TableDataDiff::is_in_sync));

        let missing = svc.sync_table_data(&endpoints, "nope", None).await;
        assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_sync_tables_data_defaults_to_shared_tables() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec(
            "src",
            &[
                USERS,
                POSTS,
                SEED_USERS,
                "INSERT INTO posts (id, user_id, title) VALUES (10, 1, 'hello')",
            ],
        )
        .await;
        fx.exec("dst", &[USERS, POSTS]).await;
        let (svc, _) = service(&fx);

        let report = svc
            .sync_tables_data(&Endpoints::new("src", "dst"), &[], None)
            .await;
        assert_eq!(report.outcome(), SyncOutcome::Success);
        let tables: Vec<&str> = report.results.iter().map(|r| r.table.as_str()).collect();
        assert_eq!(tables, vec!["users", "posts"]);
        assert_eq!(fx.count("dst", "posts").await, 1);
    }

    #[tokio::test]
    async fn test_dump_and_restore() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec(
            "src",
            &[
                USERS,
                POSTS,
                SEED_USERS,
                "INSERT INTO posts (id, user_id, title) VALUES (10, 1, 'hello'), (11, 2, 'again')",
            ],
        )
        .await;
        fx.exec(
            "dst",
            &[
                USERS,
                POSTS,
                "INSERT INTO users (id, name) VALUES (9, 'stale')",
                "INSERT INTO posts (id, user_id, title) VALUES (90, 9, 'stale')",
            ],
        )
        .await;
        let (svc, _) = service(&fx);

        let result = svc
            .dump_and_restore(&Endpoints::new("src", "dst"), None)
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.rows_copied, 4);
        assert_eq!(result.tables_processed, 2);
        assert_eq!(fx.count("dst", "users").await, 2);
        assert_eq!(fx.count("dst", "posts").await, 2);
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_the_batch() {
        let fx = Fixture::new(&["src"]);
        fx.exec("src", &[USERS, SEED_USERS]).await;
        let (svc, _) = service(&fx);
        let endpoints = Endpoints::new("src", "ghost");

        let report = svc.sync_tables_data(&endpoints, &[], None).await;
        assert!(report.results.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.error_kind.is_some());
        assert_eq!(report.outcome(), SyncOutcome::Failed);

        let named = svc
            .sync_tables_data(&endpoints, &["users".to_string()], None)
            .await;
        assert_eq!(named.failed, 1);
        assert_eq!(named.outcome(), SyncOutcome::Failed);

        let dump = svc.dump_and_restore(&endpoints, None).await.unwrap();
        assert!(!dump.success);
        assert_eq!(dump.errors.len(), 1);
        assert!(dump.table_results.is_empty());
    }

    #[tokio::test]
    async fn test_connections_and_groups() {
        let fx = Fixture::new(&["src", "dst"]);
        fx.exec("src", &[USERS]).await;
        fx.exec("dst", &[USERS]).await;
        fx.group(InstanceGroup::new("g1", "fleet", "src").target("dst"));
        let (svc, _) = service(&fx);

        assert!(svc.test_connection("src").await.unwrap().success);
        assert_eq!(svc.get_schemas("src").await.unwrap(), vec!["main".to_string()]);

        let status = svc.get_group_sync_status("g1").await.unwrap();
        assert_eq!(status.group_name, "fleet");
        assert_eq!(status.in_sync_count(), 1);

        let err = svc.get_group_sync_status("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = svc.check_single_target_status("g1", "src").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let target = svc.check_single_target_status("g1", "dst").await.unwrap();
        assert!(target.is_in_sync());

        svc.shutdown().await;
        assert_eq!(svc.pool().stats().cached, 0);
    }
}
