//! Full reload of a table set ("dump and restore").
//!
//! Target tables are emptied children first and reloaded parents first. FK
//! edges that had to be ignored to order the set (cycles, self-references)
//! are handled in one of two ways:
//!
//! - engines with a session switch for FK enforcement (SQLite, MySQL,
//!   MariaDB) run the whole reload with enforcement off;
//! - other engines (PostgreSQL) drop the deferred constraints before loading
//!   and add them back afterwards.
//!
//! The target is written through one [`Session`] so session settings stick.

use std::collections::HashMap;

use dbsync_core::{
    DependencyGraph, DumpDefaults, EngineDialect, Row, Schema, Session, SyncError, SyncResult,
    Table,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pair::{ConnectionPair, select_sql};
use crate::write::RowWriter;

/// How a reload behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpOptions {
    /// Empty each target table before copying.
    pub truncate_target: bool,
    /// Rows per source page and per `INSERT`.
    pub batch_size: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self::from(&DumpDefaults::default())
    }
}

impl From<&DumpDefaults> for DumpOptions {
    fn from(defaults: &DumpDefaults) -> Self {
        Self {
            truncate_target: defaults.truncate_target,
            batch_size: defaults.batch_size,
        }
    }
}

/// Rows copied into one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDumpResult {
    pub table: String,
    pub rows: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpRestoreResult {
    /// No table and no session step recorded an error.
    pub success: bool,
    /// Tables copied without error.
    pub tables_processed: usize,
    pub rows_copied: u64,
    pub errors: Vec<String>,
    /// One entry per table, in load order.
    pub table_results: Vec<TableDumpResult>,
    /// Deferred FK edges and skipped tables.
    pub warnings: Vec<String>,
}

impl DumpRestoreResult {
    fn finish(mut self) -> Self {
        self.tables_processed = self
            .table_results
            .iter()
            .filter(|r| r.error.is_none())
            .count();
        self.rows_copied = self.table_results.iter().map(|r| r.rows).sum();
        self.success = self.errors.is_empty();
        self
    }

    /// A reload that could not start.
    pub fn aborted(error: &SyncError) -> Self {
        Self {
            errors: vec![error.to_string()],
            ..Self::default()
        }
    }

    /// Result for `table`, if it took part.
    pub fn table(&self, table: &str) -> Option<&TableDumpResult> {
        self.table_results.iter().find(|r| r.table == table)
    }
}

/// Replace the target's rows with the source's for every table present in
/// both snapshots.
///
/// Only validation problems are returned as `Err`; everything that happens
/// once writing starts is reported in the result.
pub async fn dump_and_restore(
    pair: &ConnectionPair,
    source_schema: &Schema,
    target_schema: &Schema,
    options: &DumpOptions,
) -> SyncResult<DumpRestoreResult> {
    pair.ensure_separate_connections()?;

    let mut result = DumpRestoreResult::default();
    let mut names = Vec::new();
    for table in &source_schema.tables {
        if target_schema.table(&table.name).is_some() {
            names.push(table.name.clone());
        } else {
            result
                .warnings
                .push(format!("table '{}' does not exist in target; skipped", table.name));
        }
    }

    let order = DependencyGraph::for_tables(target_schema, &names).load_order();
    result.warnings.extend(
        order
            .deferred
            .iter()
            .map(|edge| format!("foreign key {edge} deferred during reload")),
    );

    let mut session = match pair.target.session().await {
        Ok(session) => session,
        Err(e) => {
            warn!(target = %pair.target.id(), error = %e, "Reload could not start");
            result.errors.push(e.to_string());
            result.table_results = order
                .tables
                .iter()
                .map(|t| TableDumpResult {
                    table: t.clone(),
                    rows: 0,
                    error: Some(e.to_string()),
                })
                .collect();
            return Ok(result.finish());
        }
    };
    let dialect = session.dialect();

    // FK enforcement off, or deferred constraints dropped.
    let mut checks_disabled = false;
    let mut restore = Vec::new();
    match dialect.disable_fk_checks() {
        Some(sql) => match session.query(sql).await {
            Ok(_) => checks_disabled = true,
            Err(e) => result.errors.push(e.to_string()),
        },
        None => {
            for edge in &order.deferred {
                let Some(fk) = target_schema
                    .table(&edge.table)
                    .and_then(|t| t.foreign_keys.iter().find(|fk| fk.name == edge.foreign_key))
                else {
                    continue;
                };
                let qualified = pair.target_table(&edge.table);
                match session.query(&dialect.drop_foreign_key(&qualified, &fk.name)).await {
                    Ok(_) => restore.push(dialect.add_foreign_key(
                        &qualified,
                        fk,
                        &pair.target_table(&fk.referenced_table),
                    )),
                    Err(e) => result.errors.push(e.to_string()),
                }
            }
        }
    }

    // Table -> truncate error; those tables are not reloaded.
    let mut failed: HashMap<String, String> = HashMap::new();
    if options.truncate_target {
        if !checks_disabled {
            failed.extend(referenced_from_outside(target_schema, &order.tables));
        }
        let tables: Vec<String> = order
            .truncate_order()
            .into_iter()
            .filter(|t| !failed.contains_key(t))
            .collect();
        let qualified: Vec<String> = tables.iter().map(|t| pair.target_table(t)).collect();
        let statements = dialect.truncate_tables(&qualified);
        let per_table = statements.len() == tables.len();
        for (i, sql) in statements.iter().enumerate() {
            if let Err(e) = session.query(sql).await {
                let affected = if per_table { &tables[i..=i] } else { &tables[..] };
                for name in affected {
                    warn!(table = %name, error = %e, "Truncate failed");
                    failed.insert(name.clone(), e.to_string());
                }
            }
        }
    }

    for name in &order.tables {
        let (Some(source), Some(target)) = (source_schema.table(name), target_schema.table(name))
        else {
            continue;
        };
        let mut table_result = TableDumpResult {
            table: name.clone(),
            rows: 0,
            error: None,
        };
        let outcome = match failed.remove(name) {
            Some(e) => Err(e),
            None => {
                let rows = &mut table_result.rows;
                copy_table(pair, &mut session, source, target, options, rows)
                    .await
                    .map_err(|e| e.to_string())
            }
        };
        if let Err(e) = outcome {
            warn!(table = %name, rows = table_result.rows, error = %e, "Table reload failed");
            result.errors.push(format!("{name}: {e}"));
            table_result.error = Some(e);
        } else {
            debug!(table = %name, rows = table_result.rows, "Table reloaded");
        }
        result.table_results.push(table_result);
    }

    for sql in &restore {
        if let Err(e) = session.query(sql).await {
            result.errors.push(e.to_string());
        }
    }
    if checks_disabled
        && let Some(sql) = dialect.enable_fk_checks()
        && let Err(e) = session.query(sql).await
    {
        result.errors.push(e.to_string());
    }

    let result = result.finish();
    info!(
        source = %pair.source.id(),
        target = %pair.target.id(),
        tables = result.table_results.len(),
        processed = result.tables_processed,
        rows = result.rows_copied,
        errors = result.errors.len(),
        "Reload finished"
    );
    Ok(result)
}

/// Tables of the set that cannot be emptied without a cascade: those
/// referenced by a target table outside the set, and transitively their
/// parents inside it.
fn referenced_from_outside(target_schema: &Schema, set: &[String]) -> Vec<(String, String)> {
    let mut blocked: Vec<(String, String)> = Vec::new();
    loop {
        let mut added = false;
        for table in &target_schema.tables {
            let kept = !set.contains(&table.name)
                || blocked.iter().any(|(name, _)| *name == table.name);
            if !kept {
                continue;
            }
            for fk in &table.foreign_keys {
                if fk.referenced_table == table.name
                    || !set.contains(&fk.referenced_table)
                    || blocked.iter().any(|(name, _)| *name == fk.referenced_table)
                {
                    continue;
                }
                let message = SyncError::validation(format!(
                    "table '{}' is referenced by '{}' ({}), which keeps its rows; not truncated",
                    fk.referenced_table, table.name, fk.name
                ));
                blocked.push((fk.referenced_table.clone(), message.to_string()));
                added = true;
            }
        }
        if !added {
            return blocked;
        }
    }
}

/// Copy every source row of one table, a page at a time when the table has
/// a primary key to order by.
async fn copy_table(
    pair: &ConnectionPair,
    session: &mut Session,
    source: &Table,
    target: &Table,
    options: &DumpOptions,
    copied: &mut u64,
) -> SyncResult<()> {
    let columns: Vec<String> = source
        .columns
        .iter()
        .filter(|c| target.get_column(&c.name).is_some())
        .map(|c| c.name.clone())
        .collect();
    if columns.is_empty() {
        return Err(SyncError::validation(format!(
            "table '{}' shares no columns with the target",
            source.name
        )));
    }

    let key = source.primary_key();
    let ordered = !key.is_empty();
    let source_dialect: &dyn EngineDialect = pair.source.dialect();
    let base = select_sql(source_dialect, &pair.source_table(&source.name), &columns, &key);
    let writer = RowWriter::new(session.dialect(), pair.target_table(&target.name), target);
    let batch = options.batch_size.max(1);

    let mut offset = 0u64;
    loop {
        let sql = if ordered {
            format!("{base} {}", source_dialect.limit_offset(batch as u64, offset))
        } else {
            base.clone()
        };
        let rows = pair.source.query(&sql).await?.rows;
        let fetched = rows.len();
        for chunk in rows.chunks(batch) {
            let refs: Vec<&Row> = chunk.iter().collect();
            session.query(&writer.insert(&columns, &refs)).await?;
            *copied += chunk.len() as u64;
        }
        if !ordered || fetched < batch {
            return Ok(());
        }
        offset += fetched as u64;
    }
}
