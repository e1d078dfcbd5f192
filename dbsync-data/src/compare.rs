//! Data diff: per-table row counts and primary-key presence.
//!
//! Everything here is read-only and stateless; callers cache results.

use std::collections::HashSet;

use dbsync_core::{ConnectionHandle, RowKey, Schema, SyncResult, Table, row_key};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pair::{ConnectionPair, count_rows, select_sql};

/// Row-level difference of one table.
///
/// The `missing_*` counters are `None` when the table has no primary key;
/// presence cannot be compared without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataDiff {
    pub table: String,
    pub source_count: u64,
    pub target_count: u64,
    pub missing_in_target: Option<u64>,
    pub missing_in_source: Option<u64>,
}

impl TableDataDiff {
    /// Whether key presence was compared.
    pub fn keys_compared(&self) -> bool {
        self.missing_in_target.is_some() && self.missing_in_source.is_some()
    }

    /// Counts match and no key is missing on either side. Tables without a
    /// primary key are judged on counts alone.
    pub fn is_in_sync(&self) -> bool {
        self.source_count == self.target_count
            && self.missing_in_target.unwrap_or(0) == 0
            && self.missing_in_source.unwrap_or(0) == 0
    }
}

/// One-line summary of a set of table diffs.
pub fn summarize(diffs: &[TableDataDiff]) -> String {
    let out_of_sync: Vec<&TableDataDiff> = diffs.iter().filter(|d| !d.is_in_sync()).collect();
    if out_of_sync.is_empty() {
        return format!("{} tables in sync", diffs.len());
    }
    let missing: u64 = out_of_sync
        .iter()
        .map(|d| d.missing_in_target.unwrap_or(0))
        .sum();
    let extra: u64 = out_of_sync
        .iter()
        .map(|d| d.missing_in_source.unwrap_or(0))
        .sum();
    format!(
        "{} of {} tables out of sync ({} rows missing in target, {} extra in target)",
        out_of_sync.len(),
        diffs.len(),
        missing,
        extra
    )
}

/// Compare every table present in both snapshots.
///
/// Tables are visited in the source snapshot's (name) order. Any failed
/// query fails the whole call; no partial result is returned.
pub async fn compute_table_diffs(
    pair: &ConnectionPair,
    source: &Schema,
    target: &Schema,
) -> SyncResult<Vec<TableDataDiff>> {
    let mut diffs = Vec::new();
    for table in &source.tables {
        let Some(target_table) = target.table(&table.name) else {
            continue;
        };
        diffs.push(diff_table(pair, table, target_table).await?);
    }
    info!(
        source = %pair.source.id(),
        target = %pair.target.id(),
        tables = diffs.len(),
        out_of_sync = diffs.iter().filter(|d| !d.is_in_sync()).count(),
        "Data diff computed"
    );
    Ok(diffs)
}

/// Compare one table.
pub async fn diff_table(
    pair: &ConnectionPair,
    source: &Table,
    target: &Table,
) -> SyncResult<TableDataDiff> {
    let source_name = pair.source_table(&source.name);
    let target_name = pair.target_table(&target.name);

    let (source_count, target_count) = tokio::join!(
        count_rows(&pair.source, &source_name),
        count_rows(&pair.target, &target_name)
    );
    let mut diff = TableDataDiff {
        table: source.name.clone(),
        source_count: source_count?,
        target_count: target_count?,
        missing_in_target: None,
        missing_in_source: None,
    };

    let key = source.primary_key();
    if key.is_empty() || !key.iter().all(|k| target.get_column(k).is_some()) {
        debug!(table = %source.name, "No usable primary key; counts only");
        return Ok(diff);
    }

    let (source_keys, target_keys) = tokio::join!(
        fetch_keys(&pair.source, &source_name, &key),
        fetch_keys(&pair.target, &target_name, &key)
    );
    let (source_keys, target_keys) = (source_keys?, target_keys?);
    diff.missing_in_target = Some(source_keys.difference(&target_keys).count() as u64);
    diff.missing_in_source = Some(target_keys.difference(&source_keys).count() as u64);
    Ok(diff)
}

async fn fetch_keys(
    conn: &ConnectionHandle,
    qualified: &str,
    key: &[String],
) -> SyncResult<HashSet<RowKey>> {
    let sql = select_sql(conn.dialect(), qualified, key, &[]);
    let result = conn.query(&sql).await?;
    Ok(result.rows.iter().map(|r| row_key(r, key)).collect())
}
