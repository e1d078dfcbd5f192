//! Schema diffing.
//!
//! A diff describes what has to change on the target for it to match the
//! source: objects only in the source are `added`, objects only in the target
//! are `removed`. Renames are not detected; a renamed column shows up as one
//! removal and one addition.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use dbsync_core::{Column, Engine, ForeignKey, Index, Schema, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    fn verb(&self) -> &'static str {
        match self {
            Self::Added => "Add",
            Self::Removed => "Drop",
            Self::Modified => "Alter",
        }
    }
}

/// Kind of schema object a diff entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    ForeignKey,
}

impl ObjectKind {
    fn noun(&self, count: usize) -> &'static str {
        match (self, count) {
            (Self::Table, 1) => "table",
            (Self::Table, _) => "tables",
            (Self::Column, 1) => "column",
            (Self::Column, _) => "columns",
            (Self::Index, 1) => "index",
            (Self::Index, _) => "indexes",
            (Self::ForeignKey, 1) => "foreign key",
            (Self::ForeignKey, _) => "foreign keys",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun(1))
    }
}

/// The object on one side of a diff entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffObject {
    Table(Table),
    Column(Column),
    Index(Index),
    ForeignKey(ForeignKey),
}

/// One unit of structural difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub object_kind: ObjectKind,
    /// `table` or `table.object`.
    pub path: String,
    /// Table the entry belongs to.
    pub table: String,
    /// Target-side object (removed or modified entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DiffObject>,
    /// Source-side object (added or modified entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DiffObject>,
    /// Changed attribute names on modified columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
}

impl DiffEntry {
    fn table_entry(change_type: ChangeType, before: Option<&Table>, after: Option<&Table>) -> Self {
        let name = after.or(before).map(|t| t.name.clone()).unwrap_or_default();
        Self {
            change_type,
            object_kind: ObjectKind::Table,
            path: name.clone(),
            table: name,
            before: before.cloned().map(DiffObject::Table),
            after: after.cloned().map(DiffObject::Table),
            changes: Vec::new(),
        }
    }

    fn child(
        change_type: ChangeType,
        object_kind: ObjectKind,
        table: &str,
        name: &str,
        before: Option<DiffObject>,
        after: Option<DiffObject>,
    ) -> Self {
        Self {
            change_type,
            object_kind,
            path: format!("{table}.{name}"),
            table: table.to_string(),
            before,
            after,
            changes: Vec::new(),
        }
    }

    /// Source-side table of a table entry.
    pub fn after_table(&self) -> Option<&Table> {
        match &self.after {
            Some(DiffObject::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Target-side table of a table entry.
    pub fn before_table(&self) -> Option<&Table> {
        match &self.before {
            Some(DiffObject::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Source-side column of a column entry.
    pub fn after_column(&self) -> Option<&Column> {
        match &self.after {
            Some(DiffObject::Column(c)) => Some(c),
            _ => None,
        }
    }

    /// Target-side column of a column entry.
    pub fn before_column(&self) -> Option<&Column> {
        match &self.before {
            Some(DiffObject::Column(c)) => Some(c),
            _ => None,
        }
    }

    /// Source-side index of an index entry.
    pub fn after_index(&self) -> Option<&Index> {
        match &self.after {
            Some(DiffObject::Index(i)) => Some(i),
            _ => None,
        }
    }

    /// Target-side index of an index entry.
    pub fn before_index(&self) -> Option<&Index> {
        match &self.before {
            Some(DiffObject::Index(i)) => Some(i),
            _ => None,
        }
    }

    /// Source-side foreign key of a foreign key entry.
    pub fn after_foreign_key(&self) -> Option<&ForeignKey> {
        match &self.after {
            Some(DiffObject::ForeignKey(fk)) => Some(fk),
            _ => None,
        }
    }

    /// Target-side foreign key of a foreign key entry.
    pub fn before_foreign_key(&self) -> Option<&ForeignKey> {
        match &self.before {
            Some(DiffObject::ForeignKey(fk)) => Some(fk),
            _ => None,
        }
    }
}

/// An ordered structural diff between a source and a target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    pub source_engine: Engine,
    pub target_engine: Engine,
    pub source_schema: String,
    pub target_schema: String,
    pub entries: Vec<DiffEntry>,
}

impl SchemaDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries for one table, table entry first.
    pub fn for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a DiffEntry> {
        self.entries.iter().filter(move |e| e.table == table)
    }

    /// Table-level entries.
    pub fn tables(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| e.object_kind == ObjectKind::Table)
    }

    /// Entry counts per object kind.
    pub fn count_by_kind(&self) -> BTreeMap<ObjectKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.object_kind).or_insert(0) += 1;
        }
        counts
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<(ObjectKind, ChangeType), usize> = BTreeMap::new();
        for entry in &self.entries {
            *counts
                .entry((entry.object_kind, entry.change_type))
                .or_insert(0) += 1;
        }

        let parts: Vec<String> = counts
            .into_iter()
            .map(|((kind, change), n)| format!("{} {} {}", change.verb(), n, kind.noun(n)))
            .collect();

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Computes [`SchemaDiff`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaDiffer;

impl SchemaDiffer {
    /// Create a differ.
    pub fn new() -> Self {
        Self
    }

    /// Diff `source` (desired state) against `target` (current state).
    pub fn diff(&self, source: &Schema, target: &Schema) -> SchemaDiff {
        let mut table_entries = Vec::new();
        let mut child_entries = Vec::new();

        let mut names: Vec<&str> = source
            .tables
            .iter()
            .chain(target.tables.iter())
            .map(|t| t.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();

        for name in names {
            match (source.table(name), target.table(name)) {
                (Some(src), None) => {
                    table_entries.push(DiffEntry::table_entry(ChangeType::Added, None, Some(src)));
                }
                (None, Some(tgt)) => {
                    table_entries.push(DiffEntry::table_entry(ChangeType::Removed, Some(tgt), None));
                }
                (Some(src), Some(tgt)) => {
                    let children = diff_table(src, tgt);
                    if !children.is_empty() {
                        table_entries.push(DiffEntry::table_entry(
                            ChangeType::Modified,
                            Some(tgt),
                            Some(src),
                        ));
                        child_entries.extend(children);
                    }
                }
                (None, None) => {}
            }
        }

        let mut entries = table_entries;
        entries.extend(child_entries);

        let diff = SchemaDiff {
            source_engine: source.engine,
            target_engine: target.engine,
            source_schema: source.schema_name.clone(),
            target_schema: target.schema_name.clone(),
            entries,
        };
        debug!(
            source = %diff.source_schema,
            target = %diff.target_schema,
            summary = %diff.summary(),
            "Schemas diffed"
        );
        diff
    }
}

/// Diff two schemas with the default differ.
pub fn diff_schemas(source: &Schema, target: &Schema) -> SchemaDiff {
    SchemaDiffer::new().diff(source, target)
}

/// Columns, then indexes, then foreign keys of one table present on both sides.
fn diff_table(source: &Table, target: &Table) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let table = source.name.as_str();

    for src in &source.columns {
        match target.get_column(&src.name) {
            None => entries.push(DiffEntry::child(
                ChangeType::Added,
                ObjectKind::Column,
                table,
                &src.name,
                None,
                Some(DiffObject::Column(src.clone())),
            )),
            Some(tgt) => {
                let changes = src.changed_attributes(tgt);
                if !changes.is_empty() {
                    let mut entry = DiffEntry::child(
                        ChangeType::Modified,
                        ObjectKind::Column,
                        table,
                        &src.name,
                        Some(DiffObject::Column(tgt.clone())),
                        Some(DiffObject::Column(src.clone())),
                    );
                    entry.changes = changes.into_iter().map(str::to_string).collect();
                    entries.push(entry);
                }
            }
        }
    }
    for tgt in &target.columns {
        if source.get_column(&tgt.name).is_none() {
            entries.push(DiffEntry::child(
                ChangeType::Removed,
                ObjectKind::Column,
                table,
                &tgt.name,
                Some(DiffObject::Column(tgt.clone())),
                None,
            ));
        }
    }

    // The primary index is covered by the columns' isPrimaryKey flag.
    let src_indexes: Vec<&Index> = source.secondary_indexes().collect();
    let tgt_indexes: Vec<&Index> = target.secondary_indexes().collect();
    entries.extend(diff_named(
        table,
        ObjectKind::Index,
        &src_indexes,
        &tgt_indexes,
        |i| &i.name,
        Index::same_definition,
        |i| DiffObject::Index(i.clone()),
    ));

    let src_fks: Vec<&ForeignKey> = source.foreign_keys.iter().collect();
    let tgt_fks: Vec<&ForeignKey> = target.foreign_keys.iter().collect();
    entries.extend(diff_named(
        table,
        ObjectKind::ForeignKey,
        &src_fks,
        &tgt_fks,
        |fk| &fk.name,
        ForeignKey::same_definition,
        |fk| DiffObject::ForeignKey(fk.clone()),
    ));

    entries
}

/// Match objects by name first, then pair leftovers with identical
/// definitions so engine-generated names do not produce churn.
fn diff_named<T>(
    table: &str,
    kind: ObjectKind,
    source: &[&T],
    target: &[&T],
    name: impl Fn(&T) -> &String,
    same: impl Fn(&T, &T) -> bool,
    wrap: impl Fn(&T) -> DiffObject,
) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut matched_target: HashSet<usize> = HashSet::new();
    let mut unmatched_source = Vec::new();

    for &src in source {
        let by_name = target
            .iter()
            .position(|&t| !name(src).is_empty() && name(t) == name(src));
        match by_name {
            Some(pos) => {
                matched_target.insert(pos);
                let tgt = target[pos];
                if !same(src, tgt) {
                    entries.push(DiffEntry::child(
                        ChangeType::Modified,
                        kind,
                        table,
                        name(src),
                        Some(wrap(tgt)),
                        Some(wrap(src)),
                    ));
                }
            }
            None => unmatched_source.push(src),
        }
    }

    for src in unmatched_source {
        let by_definition = target
            .iter()
            .enumerate()
            .position(|(pos, &t)| !matched_target.contains(&pos) && same(src, t));
        match by_definition {
            Some(pos) => {
                matched_target.insert(pos);
            }
            None => entries.push(DiffEntry::child(
                ChangeType::Added,
                kind,
                table,
                name(src),
                None,
                Some(wrap(src)),
            )),
        }
    }

    for (pos, &tgt) in target.iter().enumerate() {
        if !matched_target.contains(&pos) {
            entries.push(DiffEntry::child(
                ChangeType::Removed,
                kind,
                table,
                name(tgt),
                Some(wrap(tgt)),
                None,
            ));
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn users(with_name: bool) -> Table {
        let mut table = Table::new("users").column(Column::new("id", "integer").primary_key());
        if with_name {
            table = table.column(Column::new("name", "text"));
        }
        table
    }

    fn schema(engine: Engine, tables: Vec<Table>) -> Schema {
        tables
            .into_iter()
            .fold(Schema::new(engine, "public"), Schema::with_table)
    }

    fn fk(name: &str) -> ForeignKey {
        ForeignKey::new(
            name,
            vec!["customer_id".to_string()],
            "customers",
            vec!["id".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_identical_schemas_have_empty_diff() {
        let a = schema(Engine::Postgres, vec![users(true)]);
        let diff = diff_schemas(&a, &a.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "No changes");
    }

    #[test]
    fn test_added_column_under_modified_table() {
        let source = schema(Engine::Postgres, vec![users(true)]);
        let target = schema(Engine::Postgres, vec![users(false)]);
        let diff = diff_schemas(&source, &target);

        assert_eq!(diff.len(), 2);
        assert_eq!(diff.entries[0].change_type, ChangeType::Modified);
        assert_eq!(diff.entries[0].object_kind, ObjectKind::Table);
        assert_eq!(diff.entries[1].change_type, ChangeType::Added);
        assert_eq!(diff.entries[1].object_kind, ObjectKind::Column);
        assert_eq!(diff.entries[1].path, "users.name");
        assert_eq!(diff.entries[1].after_column().unwrap().data_type, "text");
    }

    #[test]
    fn test_added_and_removed_tables_sorted_before_children() {
        let source = schema(
            Engine::Postgres,
            vec![users(true), Table::new("accounts").column(Column::new("id", "integer"))],
        );
        let target = schema(
            Engine::Postgres,
            vec![users(false), Table::new("zones").column(Column::new("id", "integer"))],
        );
        let diff = diff_schemas(&source, &target);
        let paths: Vec<_> = diff
            .entries
            .iter()
            .map(|e| (e.change_type, e.path.as_str()))
            .collect();
        assert_eq!(
            paths,
            vec![
                (ChangeType::Added, "accounts"),
                (ChangeType::Modified, "users"),
                (ChangeType::Removed, "zones"),
                (ChangeType::Added, "users.name"),
            ]
        );
        assert_eq!(diff.summary(), "Add 1 table, Drop 1 table, Alter 1 table, Add 1 column");
    }

    #[test]
    fn test_modified_column_lists_changes() {
        let source = schema(
            Engine::Postgres,
            vec![Table::new("t").column(Column::new("a", "varchar(50)").not_null())],
        );
        let target = schema(
            Engine::Postgres,
            vec![Table::new("t").column(Column::new("a", "text"))],
        );
        let diff = diff_schemas(&source, &target);
        let column = &diff.entries[1];
        assert_eq!(column.change_type, ChangeType::Modified);
        assert_eq!(column.changes, vec!["dataType", "nullable"]);
        assert_eq!(column.before_column().unwrap().data_type, "text");
    }

    #[test]
    fn test_rename_is_drop_and_add() {
        let source = schema(
            Engine::Sqlite,
            vec![Table::new("t").column(Column::new("full_name", "text"))],
        );
        let target = schema(
            Engine::Sqlite,
            vec![Table::new("t").column(Column::new("name", "text"))],
        );
        let diff = diff_schemas(&source, &target);
        assert_eq!(diff.count_by_kind().get(&ObjectKind::Column), Some(&2));
    }

    #[test]
    fn test_indexes_match_by_definition_when_names_differ() {
        let idx = |name: &str| Index::new(name, vec!["email".to_string()]).unique();
        let source = schema(Engine::Postgres, vec![users(true).index(idx("users_email_key"))]);
        let target = schema(Engine::MySql, vec![users(true).index(idx("email"))]);
        assert!(diff_schemas(&source, &target).is_empty());
    }

    #[test]
    fn test_index_definition_change_is_modified() {
        let source = schema(
            Engine::Postgres,
            vec![users(true).index(Index::new("idx_name", vec!["name".to_string()]).unique())],
        );
        let target = schema(
            Engine::Postgres,
            vec![users(true).index(Index::new("idx_name", vec!["name".to_string()]))],
        );
        let diff = diff_schemas(&source, &target);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.entries[1].object_kind, ObjectKind::Index);
        assert_eq!(diff.entries[1].change_type, ChangeType::Modified);
    }

    #[test]
    fn test_primary_index_is_not_diffed() {
        let source = schema(
            Engine::Postgres,
            vec![users(false).index(Index::new("users_pkey", vec!["id".to_string()]).primary())],
        );
        let target = schema(Engine::Sqlite, vec![users(false)]);
        assert!(diff_schemas(&source, &target).is_empty());
    }

    #[test]
    fn test_foreign_keys_added_and_removed() {
        let orders = |fk: Option<ForeignKey>| {
            let table = Table::new("orders")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("customer_id", "integer"));
            match fk {
                Some(fk) => table.foreign_key(fk),
                None => table,
            }
        };
        let with_fk = schema(Engine::Postgres, vec![orders(Some(fk("orders_customer_id_fkey")))]);
        let without = schema(Engine::Postgres, vec![orders(None)]);

        let added = diff_schemas(&with_fk, &without);
        assert_eq!(added.entries[1].change_type, ChangeType::Added);
        assert_eq!(added.entries[1].object_kind, ObjectKind::ForeignKey);

        let removed = diff_schemas(&without, &with_fk);
        assert_eq!(removed.entries[1].change_type, ChangeType::Removed);
        assert!(removed.entries[1].before_foreign_key().is_some());

        let renamed = schema(Engine::MySql, vec![orders(Some(fk("fk_orders_customer")))]);
        assert!(diff_schemas(&with_fk, &renamed).is_empty());
    }

    #[test]
    fn test_diff_serializes_with_camel_case() {
        let source = schema(Engine::Postgres, vec![users(true)]);
        let target = schema(Engine::Postgres, vec![users(false)]);
        let json = serde_json::to_value(diff_schemas(&source, &target)).unwrap();
        assert_eq!(json["entries"][1]["type"], "added");
        assert_eq!(json["entries"][1]["objectKind"], "column");
        assert_eq!(json["entries"][1]["after"]["dataType"], "text");

        let back: SchemaDiff = serde_json::from_value(json).unwrap();
        assert!(back.entries[1].after_column().is_some());
        assert!(back.entries[0].after_table().is_some());
    }
}
