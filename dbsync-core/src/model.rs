//! Normalized schema model shared by every engine adapter.
//!
//! Introspection turns a live catalog into these types; the differ, the SQL
//! generator and the data engines only ever see this representation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{SyncError, SyncResult};

/// A snapshot of one schema (or MySQL database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Engine the snapshot was read from.
    pub engine: Engine,
    /// Schema name.
    pub schema_name: String,
    /// Tables, unique by name.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Create an empty schema snapshot.
    pub fn new(engine: Engine, schema_name: impl Into<String>) -> Self {
        Self {
            engine,
            schema_name: schema_name.into(),
            tables: Vec::new(),
        }
    }

    /// Add a table, builder style.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Add a table, rejecting duplicate names.
    pub fn add_table(&mut self, table: Table) -> SyncResult<()> {
        if self.table(&table.name).is_some() {
            return Err(SyncError::introspection(format!(
                "duplicate table '{}' in schema '{}'",
                table.name, self.schema_name
            )));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table names in snapshot order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Check the snapshot invariants.
    pub fn validate(&self) -> SyncResult<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(SyncError::introspection(format!(
                    "duplicate table '{}' in schema '{}'",
                    table.name, self.schema_name
                )));
            }
            for fk in &table.foreign_keys {
                fk.validate(&table.name)?;
            }
        }
        Ok(())
    }
}

/// A table with its columns, indexes and foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add a column, builder style.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add an index, builder style.
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a foreign key, builder style.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Look up a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns in key order.
    ///
    /// The primary index gives the declared order; without one, flagged
    /// columns are returned in table order.
    pub fn primary_key(&self) -> Vec<String> {
        if let Some(pk) = self.indexes.iter().find(|i| i.is_primary) {
            return pk.columns.clone();
        }
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Whether a primary key is declared.
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key().is_empty()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Secondary indexes (everything except the primary key index).
    pub fn secondary_indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.iter().filter(|i| !i.is_primary)
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    /// Normalized type used for diffing (e.g. `integer`, `varchar(255)`).
    pub data_type: String,
    /// Original DDL-significant type string used for code generation.
    pub native_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_unique: bool,
    #[serde(default)]
    pub is_auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub ordinal_position: u32,
}

impl Column {
    /// Create a nullable column whose native type equals its normalized type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            native_type: data_type.clone(),
            data_type,
            nullable: true,
            is_primary_key: false,
            is_unique: false,
            is_auto_increment: false,
            default_value: None,
            ordinal_position: 0,
        }
    }

    /// Mark as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Mark as auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    /// Set the default expression.
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Set the native type string.
    pub fn native_type(mut self, native: impl Into<String>) -> Self {
        self.native_type = native.into();
        self
    }

    /// Whether any diff-relevant attribute differs from `other`.
    pub fn differs_from(&self, other: &Column) -> bool {
        !self.changed_attributes(other).is_empty()
    }

    /// Names of the diff-relevant attributes that differ from `other`.
    pub fn changed_attributes(&self, other: &Column) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.data_type != other.data_type {
            changed.push("dataType");
        }
        if self.nullable != other.nullable {
            changed.push("nullable");
        }
        if self.is_primary_key != other.is_primary_key {
            changed.push("isPrimaryKey");
        }
        if self.default_value != other.default_value {
            changed.push("defaultValue");
        }
        changed
    }
}

/// A table index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    /// Index method (`btree`, `hash`, ...).
    #[serde(rename = "type")]
    pub index_type: String,
}

impl Index {
    /// Create a non-unique btree index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
            index_type: "btree".to_string(),
        }
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Mark as the primary key index.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.is_unique = true;
        self
    }

    /// Structural equality ignoring the name.
    pub fn same_definition(&self, other: &Index) -> bool {
        self.columns == other.columns
            && self.is_unique == other.is_unique
            && self.is_primary == other.is_primary
    }
}

/// Action taken on referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Parse a catalog rule string (`CASCADE`, `SET NULL`, `a`, `c`, ...).
    pub fn parse(rule: &str) -> Self {
        match rule.trim().to_ascii_uppercase().as_str() {
            "CASCADE" | "C" => Self::Cascade,
            "RESTRICT" | "R" => Self::Restrict,
            "SET NULL" | "SET_NULL" | "N" => Self::SetNull,
            "SET DEFAULT" | "SET_DEFAULT" | "D" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// `NO ACTION` and `RESTRICT` behave the same outside deferred constraints.
    pub fn equivalent(&self, other: &ReferentialAction) -> bool {
        let norm = |a: &ReferentialAction| match a {
            Self::Restrict => Self::NoAction,
            other => *other,
        };
        norm(self) == norm(other)
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    /// Create a foreign key, checking that both column lists line up.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        referenced_table: impl Into<String>,
        referenced_columns: Vec<String>,
    ) -> SyncResult<Self> {
        let fk = Self {
            name: name.into(),
            columns,
            referenced_schema: None,
            referenced_table: referenced_table.into(),
            referenced_columns,
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        };
        fk.validate("?")?;
        Ok(fk)
    }

    /// Set the delete action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the update action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Check `columns.len() == referenced_columns.len()`.
    pub fn validate(&self, table: &str) -> SyncResult<()> {
        if self.columns.is_empty() || self.columns.len() != self.referenced_columns.len() {
            return Err(SyncError::introspection(format!(
                "foreign key '{}' on '{}' has {} columns but references {}",
                self.name,
                table,
                self.columns.len(),
                self.referenced_columns.len()
            )));
        }
        Ok(())
    }

    /// Whether the key points back at its own table.
    pub fn is_self_reference(&self, table: &str) -> bool {
        self.referenced_table == table
    }

    /// Structural equality ignoring the name.
    pub fn same_definition(&self, other: &ForeignKey) -> bool {
        self.columns == other.columns
            && self.referenced_table == other.referenced_table
            && self.referenced_columns == other.referenced_columns
            && self.on_delete.equivalent(&other.on_delete)
            && self.on_update.equivalent(&other.on_update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("email", "varchar(255)").not_null().unique())
    }

    #[test]
    fn test_add_table_rejects_duplicates() {
        let mut schema = Schema::new(Engine::Postgres, "public");
        schema.add_table(users()).unwrap();
        assert!(schema.add_table(users()).is_err());
        assert_eq!(schema.table_names(), vec!["users"]);
    }

    #[test]
    fn test_validate_detects_duplicates() {
        let schema = Schema::new(Engine::Sqlite, "main")
            .with_table(users())
            .with_table(users());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_primary_key_prefers_index_order() {
        let table = Table::new("memberships")
            .column(Column::new("user_id", "integer").primary_key())
            .column(Column::new("group_id", "integer").primary_key())
            .index(
                Index::new(
                    "memberships_pkey",
                    vec!["group_id".to_string(), "user_id".to_string()],
                )
                .primary(),
            );
        assert_eq!(table.primary_key(), vec!["group_id", "user_id"]);
        assert_eq!(table.secondary_indexes().count(), 0);
    }

    #[test]
    fn test_primary_key_from_columns() {
        assert_eq!(users().primary_key(), vec!["id"]);
        assert!(!Table::new("log").has_primary_key());
    }

    #[test]
    fn test_column_changed_attributes() {
        let a = Column::new("name", "text");
        let b = Column::new("name", "varchar(50)").not_null();
        assert_eq!(a.changed_attributes(&b), vec!["dataType", "nullable"]);
        assert!(!a.differs_from(&a.clone()));
    }

    #[test]
    fn test_foreign_key_arity_invariant() {
        let err = ForeignKey::new(
            "fk",
            vec!["a".to_string(), "b".to_string()],
            "parent",
            vec!["id".to_string()],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("CASCADE"), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse("set null"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("a"), ReferentialAction::NoAction);
        assert_eq!(ReferentialAction::parse("r"), ReferentialAction::Restrict);
        assert!(ReferentialAction::Restrict.equivalent(&ReferentialAction::NoAction));
        assert!(!ReferentialAction::Cascade.equivalent(&ReferentialAction::NoAction));
    }

    #[test]
    fn test_foreign_key_same_definition() {
        let a = ForeignKey::new(
            "orders_customer_id_fkey",
            vec!["customer_id".to_string()],
            "customers",
            vec!["id".to_string()],
        )
        .unwrap();
        let mut b = a.clone();
        b.name = "fk_orders_customers".to_string();
        b.on_delete = ReferentialAction::Restrict;
        assert!(a.same_definition(&b));
        assert!(!a.is_self_reference("orders"));
    }
}
