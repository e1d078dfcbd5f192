//! Row reconciliation ("source wins").
//!
//! A table is synced in two steps: a read-only plan comparing both row sets
//! by primary key, then the writes. Batches run inserts and updates parents
//! first and deletes children first, so FK constraints hold throughout.
//! Every table owns its own [`TableSyncResult`]; a failure never stops the
//! rest of the batch.

use dbsync_core::{
    DependencyGraph, ErrorKind, Row, RowKey, Schema, SyncDefaults, SyncError, Table, row_key,
    rows_differ,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pair::{ConnectionPair, fetch_all, select_sql};
use crate::write::RowWriter;

/// What a sync is allowed to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub insert_missing: bool,
    pub update_different: bool,
    /// Destructive: removes target rows the source does not have.
    pub delete_extra: bool,
    /// Rows per multi-row statement and per read page.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    500
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncDefaults::default())
    }
}

impl From<&SyncDefaults> for SyncOptions {
    fn from(defaults: &SyncDefaults) -> Self {
        Self {
            insert_missing: defaults.insert_missing,
            update_different: defaults.update_different,
            delete_extra: defaults.delete_extra,
            batch_size: defaults.batch_size,
        }
    }
}

impl SyncOptions {
    /// Insert, update and delete.
    pub fn all() -> Self {
        Self {
            delete_extra: true,
            ..Self::default()
        }
    }

    /// Set the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn chunk(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Outcome class of one table or a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    Partial,
    Failed,
}

/// Result of syncing one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSyncResult {
    pub table: String,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub errors: Vec<String>,
    /// Class of the first error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl TableSyncResult {
    /// An empty result for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            inserted: 0,
            updated: 0,
            deleted: 0,
            errors: Vec::new(),
            error_kind: None,
        }
    }

    /// A result holding a single error.
    pub fn failed(table: impl Into<String>, error: &SyncError) -> Self {
        let mut result = Self::new(table);
        result.record_error(error);
        result
    }

    /// Record an error.
    pub fn record_error(&mut self, error: &SyncError) {
        if self.error_kind.is_none() {
            self.error_kind = Some(error.kind());
        }
        self.errors.push(error.to_string());
    }

    /// Rows written in total.
    pub fn changed(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Whether the table synced without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Outcome class.
    pub fn outcome(&self) -> SyncOutcome {
        match (self.errors.is_empty(), self.changed()) {
            (true, _) => SyncOutcome::Success,
            (false, 0) => SyncOutcome::Failed,
            (false, _) => SyncOutcome::Partial,
        }
    }
}

/// Results of a multi-table sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncReport {
    /// One entry per table, parents first.
    pub results: Vec<TableSyncResult>,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    /// FK edges ignored while ordering the batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Errors that stopped the batch before any table ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Class of the first batch-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl BatchSyncReport {
    /// Tally a list of results.
    pub fn from_results(results: Vec<TableSyncResult>) -> Self {
        let mut report = Self::default();
        for result in &results {
            match result.outcome() {
                SyncOutcome::Success => report.succeeded += 1,
                SyncOutcome::Partial => report.partial += 1,
                SyncOutcome::Failed => report.failed += 1,
            }
        }
        report.results = results;
        report
    }

    /// A report for a batch that failed as a whole.
    pub fn aborted(error: &SyncError) -> Self {
        let mut report = Self::default();
        report.record_error(error);
        report
    }

    /// Record a batch-level error.
    pub fn record_error(&mut self, error: &SyncError) {
        if self.error_kind.is_none() {
            self.error_kind = Some(error.kind());
        }
        self.errors.push(error.to_string());
    }

    /// Overall outcome.
    pub fn outcome(&self) -> SyncOutcome {
        if !self.errors.is_empty() {
            if self.succeeded == 0 && self.partial == 0 {
                SyncOutcome::Failed
            } else {
                SyncOutcome::Partial
            }
        } else if self.partial == 0 && self.failed == 0 {
            SyncOutcome::Success
        } else if self.succeeded == 0 && self.partial == 0 {
            SyncOutcome::Failed
        } else {
            SyncOutcome::Partial
        }
    }

    /// Result for one table.
    pub fn result(&self, table: &str) -> Option<&TableSyncResult> {
        self.results.iter().find(|r| r.table == table)
    }
}

/// The writes needed to bring one target table in line with its source.
#[derive(Debug)]
struct TablePlan<'a> {
    table: &'a Table,
    key: Vec<String>,
    columns: Vec<String>,
    inserts: Vec<Row>,
    updates: Vec<Row>,
    deletes: Vec<Row>,
}

impl TablePlan<'_> {
    fn value_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !self.key.contains(c))
            .cloned()
            .collect()
    }
}

fn check_key(table: &Table, primary_keys: &[String]) -> Result<(), SyncError> {
    if primary_keys.is_empty() {
        return Err(SyncError::validation(format!(
            "table '{}' has no primary key; row sync needs one",
            table.name
        )));
    }
    if let Some(missing) = primary_keys.iter().find(|k| table.get_column(k).is_none()) {
        return Err(SyncError::validation(format!(
            "primary key column '{}' does not exist on table '{}'",
            missing, table.name
        )));
    }
    Ok(())
}

async fn plan<'a>(
    pair: &ConnectionPair,
    table: &'a Table,
    primary_keys: &[String],
    options: &SyncOptions,
) -> Result<TablePlan<'a>, SyncError> {
    check_key(table, primary_keys)?;
    let columns = table.column_names();

    let source_sql = select_sql(
        pair.source.dialect(),
        &pair.source_table(&table.name),
        &columns,
        primary_keys,
    );
    let target_sql = select_sql(
        pair.target.dialect(),
        &pair.target_table(&table.name),
        &columns,
        primary_keys,
    );
    let (source_rows, target_rows) = tokio::join!(
        fetch_all(&pair.source, &source_sql, true, options.batch_size),
        fetch_all(&pair.target, &target_sql, true, options.batch_size)
    );

    let mut target_by_key: IndexMap<RowKey, Row> = target_rows?
        .into_iter()
        .map(|r| (row_key(&r, primary_keys), r))
        .collect();

    let value_columns: Vec<String> = columns
        .iter()
        .filter(|c| !primary_keys.contains(c))
        .cloned()
        .collect();

    let mut plan = TablePlan {
        table,
        key: primary_keys.to_vec(),
        columns,
        inserts: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
    };
    for row in source_rows? {
        match target_by_key.shift_remove(&row_key(&row, primary_keys)) {
            None => {
                if options.insert_missing {
                    plan.inserts.push(row);
                }
            }
            Some(existing) => {
                if options.update_different && rows_differ(&row, &existing, &value_columns) {
                    plan.updates.push(row);
                }
            }
        }
    }
    if options.delete_extra {
        plan.deletes = target_by_key.into_values().collect();
    }

    debug!(
        table = %table.name,
        inserts = plan.inserts.len(),
        updates = plan.updates.len(),
        deletes = plan.deletes.len(),
        "Sync planned"
    );
    Ok(plan)
}

async fn apply_upserts(
    pair: &ConnectionPair,
    plan: &TablePlan<'_>,
    options: &SyncOptions,
    result: &mut TableSyncResult,
) -> Result<(), SyncError> {
    let writer = RowWriter::new(
        pair.target.dialect(),
        pair.target_table(&plan.table.name),
        plan.table,
    );

    for chunk in plan.inserts.chunks(options.chunk()) {
        let rows: Vec<&Row> = chunk.iter().collect();
        pair.target.query(&writer.insert(&plan.columns, &rows)).await?;
        result.inserted += chunk.len() as u64;
    }

    let value_columns = plan.value_columns();
    if !value_columns.is_empty() {
        for row in &plan.updates {
            pair.target
                .query(&writer.update(row, &plan.key, &value_columns))
                .await?;
            result.updated += 1;
        }
    }
    Ok(())
}

async fn apply_deletes(
    pair: &ConnectionPair,
    plan: &TablePlan<'_>,
    options: &SyncOptions,
    result: &mut TableSyncResult,
) -> Result<(), SyncError> {
    let writer = RowWriter::new(
        pair.target.dialect(),
        pair.target_table(&plan.table.name),
        plan.table,
    );
    for chunk in plan.deletes.chunks(options.chunk()) {
        let rows: Vec<&Row> = chunk.iter().collect();
        pair.target.query(&writer.delete(&plan.key, &rows)).await?;
        result.deleted += chunk.len() as u64;
    }
    Ok(())
}

/// Reconcile one table.
///
/// `table` describes the source table; the target is expected to have the
/// same columns. Errors are captured in the result, never returned.
pub async fn sync_table(
    pair: &ConnectionPair,
    table: &Table,
    primary_keys: &[String],
    options: &SyncOptions,
) -> TableSyncResult {
    let mut result = TableSyncResult::new(&table.name);
    if let Err(e) = pair.ensure_distinct() {
        result.record_error(&e);
        return result;
    }

    let outcome = async {
        let plan = plan(pair, table, primary_keys, options).await?;
        apply_upserts(pair, &plan, options, &mut result).await?;
        apply_deletes(pair, &plan, options, &mut result).await
    }
    .await;
    if let Err(e) = outcome {
        warn!(table = %table.name, error = %e, "Table sync failed");
        result.record_error(&e);
    }

    info!(
        table = %table.name,
        inserted = result.inserted,
        updated = result.updated,
        deleted = result.deleted,
        errors = result.errors.len(),
        "Table synced"
    );
    result
}

/// Reconcile several tables of `schema` (the source snapshot).
///
/// Inserts and updates run in forward dependency order, deletes in reverse.
/// Tables are keyed by their declared primary key; a table without one
/// fails validation on its own without affecting the others.
pub async fn sync_tables(
    pair: &ConnectionPair,
    schema: &Schema,
    tables: &[String],
    options: &SyncOptions,
) -> BatchSyncReport {
    let mut results: IndexMap<String, TableSyncResult> = IndexMap::new();
    if let Err(e) = pair.ensure_distinct() {
        let failed = tables.iter().map(|t| TableSyncResult::failed(t, &e)).collect();
        let mut report = BatchSyncReport::from_results(failed);
        report.record_error(&e);
        return report;
    }

    for name in tables.iter().filter(|t| schema.table(t).is_none()) {
        let e = SyncError::not_found(format!(
            "table '{}' not found in schema '{}'",
            name, schema.schema_name
        ));
        results.insert(name.clone(), TableSyncResult::failed(name, &e));
    }

    let order = DependencyGraph::for_tables(schema, tables).load_order();
    let warnings: Vec<String> = order
        .cycles()
        .map(|edge| format!("foreign key {edge} ignored to order the batch"))
        .collect();

    let mut plans = Vec::new();
    for name in &order.tables {
        let Some(table) = schema.table(name) else {
            continue;
        };
        let mut result = TableSyncResult::new(name);
        match plan(pair, table, &table.primary_key(), options).await {
            Ok(plan) => {
                if let Err(e) = apply_upserts(pair, &plan, options, &mut result).await {
                    warn!(table = %name, error = %e, "Table sync failed");
                    result.record_error(&e);
                } else {
                    plans.push(plan);
                }
            }
            Err(e) => {
                warn!(table = %name, error = %e, "Table sync failed");
                result.record_error(&e);
            }
        }
        results.insert(name.clone(), result);
    }

    for plan in plans.iter().rev() {
        let Some(result) = results.get_mut(&plan.table.name) else {
            continue;
        };
        if let Err(e) = apply_deletes(pair, plan, options, result).await {
            warn!(table = %plan.table.name, error = %e, "Table delete failed");
            result.record_error(&e);
        }
    }

    // Forward order, with unknown tables last.
    let mut ordered: Vec<TableSyncResult> = order
        .tables
        .iter()
        .filter_map(|t| results.shift_remove(t))
        .collect();
    ordered.extend(results.into_values());

    let mut report = BatchSyncReport::from_results(ordered);
    report.warnings = warnings;
    info!(
        tables = report.results.len(),
        succeeded = report.succeeded,
        partial = report.partial,
        failed = report.failed,
        "Batch sync finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbsync_core::testing::{MockConnector, MockLog};
    use dbsync_core::{Column, ConnectionHandle, ConnectionInfo, Engine, ForeignKey};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn handle(id: &str, mock: MockConnector) -> ConnectionHandle {
        ConnectionHandle::new(ConnectionInfo::new(id, Engine::Sqlite), Box::new(mock))
    }

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("name", "text"))
    }

    fn pair(source: MockConnector, target: MockConnector) -> (ConnectionPair, MockLog) {
        let log = target.log();
        (
            ConnectionPair::new(handle("src", source), handle("dst", target), "main", "main"),
            log,
        )
    }

    #[tokio::test]
    async fn test_row_reconciliation() {
        let source = MockConnector::new(Engine::Sqlite).respond_rows(
            "FROM \"main\".\"users\"",
            vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
        );
        let target = MockConnector::new(Engine::Sqlite).respond_rows(
            "SELECT \"id\", \"name\" FROM \"main\".\"users\"",
            vec![json!({"id": 1, "name": "a"}), json!({"id": 3, "name": "c"})],
        );
        let (pair, log) = pair(source, target);

        let result = sync_table(&pair, &users(), &["id".to_string()], &SyncOptions::all()).await;
        assert_eq!(
            (result.inserted, result.updated, result.deleted),
            (1, 0, 1)
        );
        assert!(result.errors.is_empty());
        assert!(log.contains("INSERT INTO \"main\".\"users\" (\"id\", \"name\") VALUES (2, 'b')"));
        assert!(log.contains("DELETE FROM \"main\".\"users\" WHERE \"id\" IN (3)"));
    }

    #[tokio::test]
    async fn test_updates_only_changed_rows() {
        let source = MockConnector::new(Engine::Sqlite).respond_rows(
            "FROM \"main\".\"users\"",
            vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "B"})],
        );
        let target = MockConnector::new(Engine::Sqlite).respond_rows(
            "SELECT",
            vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})],
        );
        let (pair, log) = pair(source, target);

        let result = sync_table(&pair, &users(), &["id".to_string()], &SyncOptions::default()).await;
        assert_eq!((result.inserted, result.updated, result.deleted), (0, 1, 0));
        assert!(log.contains("UPDATE \"main\".\"users\" SET \"name\" = 'B' WHERE \"id\" = 2"));
    }

    #[tokio::test]
    async fn test_missing_primary_key_is_a_validation_error() {
        let (pair, log) = pair(
            MockConnector::new(Engine::Sqlite),
            MockConnector::new(Engine::Sqlite),
        );
        let result = sync_table(&pair, &users(), &[], &SyncOptions::all()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert_eq!(result.outcome(), SyncOutcome::Failed);
        assert!(log.statements().is_empty());
    }

    #[tokio::test]
    async fn test_same_connection_is_rejected() {
        let conn = handle("one", MockConnector::new(Engine::Sqlite));
        let pair = ConnectionPair::new(conn.clone(), conn, "main", "main");
        let result = sync_table(&pair, &users(), &["id".to_string()], &SyncOptions::all()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_orders_writes() {
        let customers = Table::new("customers")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("name", "text"));
        let orders = Table::new("orders")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("customer_id", "integer"))
            .foreign_key(
                ForeignKey::new(
                    "orders_customer_id_fkey",
                    vec!["customer_id".into()],
                    "customers",
                    vec!["id".into()],
                )
                .unwrap(),
            );
        let audit = Table::new("audit").column(Column::new("message", "text"));
        let schema = Schema::new(Engine::Sqlite, "main")
            .with_table(audit)
            .with_table(customers)
            .with_table(orders);

        let source = MockConnector::new(Engine::Sqlite)
            .respond_rows("FROM \"main\".\"customers\"", vec![json!({"id": 1, "name": "a"})])
            .respond_rows(
                "FROM \"main\".\"orders\"",
                vec![json!({"id": 10, "customer_id": 1})],
            );
        let target = MockConnector::new(Engine::Sqlite).respond_rows(
            "SELECT \"id\", \"customer_id\" FROM \"main\".\"orders\"",
            vec![json!({"id": 11, "customer_id": 2})],
        );
        let (pair, log) = pair(source, target);

        let tables = vec!["customers".to_string(), "audit".to_string(), "orders".to_string()];
        let report = sync_tables(&pair, &schema, &tables, &SyncOptions::all()).await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcome(), SyncOutcome::Partial);
        let audit = report.result("audit").unwrap();
        assert_eq!(audit.error_kind, Some(ErrorKind::Validation));
        assert_eq!(report.result("customers").unwrap().inserted, 1);
        let orders = report.result("orders").unwrap();
        assert_eq!((orders.inserted, orders.deleted), (1, 1));

        let customers_insert = log.position("INSERT INTO \"main\".\"customers\"").unwrap();
        let orders_insert = log.position("INSERT INTO \"main\".\"orders\"").unwrap();
        let orders_delete = log.position("DELETE FROM \"main\".\"orders\"").unwrap();
        assert!(customers_insert < orders_insert);
        assert!(orders_insert < orders_delete);
    }

    #[tokio::test]
    async fn test_execution_error_is_captured() {
        let source = MockConnector::new(Engine::Sqlite).respond_rows(
            "FROM \"main\".\"users\"",
            vec![json!({"id": 1, "name": "a"})],
        );
        let target = MockConnector::new(Engine::Sqlite).fail_on("INSERT", "disk I/O error");
        let (pair, _) = pair(source, target);

        let result = sync_table(&pair, &users(), &["id".to_string()], &SyncOptions::all()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Execution));
        assert_eq!(result.inserted, 0);
    }

    #[test]
    fn test_batch_level_error_fails_an_empty_report() {
        let error = SyncError::connection("ghost", "unreachable");
        let report = BatchSyncReport::aborted(&error);
        assert!(report.results.is_empty());
        assert_eq!(report.error_kind, Some(ErrorKind::Connection));
        assert_eq!(report.outcome(), SyncOutcome::Failed);

        let mut report = BatchSyncReport::from_results(vec![TableSyncResult::new("users")]);
        report.record_error(&error);
        assert_eq!(report.outcome(), SyncOutcome::Partial);
        assert_eq!(BatchSyncReport::default().outcome(), SyncOutcome::Success);
    }
}
