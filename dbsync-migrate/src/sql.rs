//! SQL generation for migrations.
//!
//! [`MigrationGenerator`] turns a [`SchemaDiff`] into an ordered list of DDL
//! statements for one target engine. Statements are grouped into phases so
//! that constraints never block the statement that follows them:
//!
//! 1. drop foreign keys
//! 2. drop indexes and primary keys
//! 3. create tables (parents first)
//! 4. add columns
//! 5. alter columns (or rebuild tables on engines without `ALTER COLUMN`)
//! 6. add primary keys
//! 7. drop columns
//! 8. drop tables (children first)
//! 9. create indexes
//! 10. add foreign keys
//!
//! Nothing is executed here; preview and apply share this path.

use dbsync_core::{
    Column, ColumnAlteration, DependencyGraph, Engine, EngineDialect, ForeignKey, Index, Table,
};
use tracing::debug;

use crate::diff::{ChangeType, DiffEntry, ObjectKind, SchemaDiff};

/// Name prefix of the scratch table used while rebuilding a table.
pub const REBUILD_PREFIX: &str = "_dbsync_new_";

/// Generates migration SQL from schema diffs.
#[derive(Debug, Clone, Default)]
pub struct MigrationGenerator {
    schema: Option<String>,
}

impl MigrationGenerator {
    /// Create a generator emitting unqualified table names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualify every table with `schema`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Generate the statements that bring a `target` database in line with
    /// the diff's source.
    pub fn generate(&self, diff: &SchemaDiff, target: Engine) -> Vec<String> {
        let ctx = Context {
            dialect: target.dialect(),
            source_engine: diff.source_engine,
            schema: self.schema.as_deref(),
        };
        let mut phases = Phases::default();

        let created: Vec<&Table> = diff
            .tables()
            .filter(|e| e.change_type == ChangeType::Added)
            .filter_map(DiffEntry::after_table)
            .collect();
        let (order, _) = dependency_order(&created);
        for table in &order {
            phases.create_tables.push(ctx.create_table(table, &table.name));
            for index in table.secondary_indexes() {
                phases.create_indexes.push(ctx.create_index(&table.name, index));
            }
            if ctx.dialect.supports_alter_foreign_keys() {
                for fk in &table.foreign_keys {
                    phases.add_foreign_keys.push(ctx.add_foreign_key(&table.name, fk));
                }
            }
        }

        let removed: Vec<&Table> = diff
            .tables()
            .filter(|e| e.change_type == ChangeType::Removed)
            .filter_map(DiffEntry::before_table)
            .collect();
        let (order, deferred) = dependency_order(&removed);
        if ctx.dialect.supports_alter_foreign_keys() {
            // Cycles among dropped tables are opened up before any drop.
            for (table, fk) in deferred {
                phases.drop_foreign_keys.push(ctx.drop_foreign_key(&table.name, &fk.name));
            }
            // Links into kept tables go first so their columns and keys can change.
            for table in &removed {
                for fk in table
                    .foreign_keys
                    .iter()
                    .filter(|fk| !removed.iter().any(|t| t.name == fk.referenced_table))
                {
                    phases.drop_foreign_keys.push(ctx.drop_foreign_key(&table.name, &fk.name));
                }
            }
        }
        for table in order.iter().rev() {
            phases.drop_tables.push(ctx.drop_table(&table.name));
        }

        for entry in diff
            .tables()
            .filter(|e| e.change_type == ChangeType::Modified)
        {
            let (Some(source), Some(target_table)) = (entry.after_table(), entry.before_table())
            else {
                continue;
            };
            let children: Vec<&DiffEntry> = diff
                .for_table(&entry.table)
                .filter(|e| e.object_kind != ObjectKind::Table)
                .collect();

            if ctx.needs_rebuild(&children) {
                phases
                    .alter_columns
                    .extend(ctx.rebuild_table(source, target_table));
            } else {
                ctx.alter_table(source, target_table, &children, &mut phases);
            }
        }

        let statements = phases.into_statements();
        debug!(
            target = %target,
            changes = diff.len(),
            statements = statements.len(),
            "Migration SQL generated"
        );
        statements
    }
}

/// Generate migration SQL with an unqualified generator.
pub fn generate_migration(diff: &SchemaDiff, target: Engine) -> Vec<String> {
    MigrationGenerator::new().generate(diff, target)
}

#[derive(Debug, Default)]
struct Phases {
    drop_foreign_keys: Vec<String>,
    drop_indexes: Vec<String>,
    create_tables: Vec<String>,
    add_columns: Vec<String>,
    alter_columns: Vec<String>,
    add_primary_keys: Vec<String>,
    drop_columns: Vec<String>,
    drop_tables: Vec<String>,
    create_indexes: Vec<String>,
    add_foreign_keys: Vec<String>,
}

impl Phases {
    fn into_statements(self) -> Vec<String> {
        [
            self.drop_foreign_keys,
            self.drop_indexes,
            self.create_tables,
            self.add_columns,
            self.alter_columns,
            self.add_primary_keys,
            self.drop_columns,
            self.drop_tables,
            self.create_indexes,
            self.add_foreign_keys,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Order tables parents-first; also returns the FK edges set aside to break
/// cycles.
fn dependency_order<'a>(tables: &[&'a Table]) -> (Vec<&'a Table>, Vec<(&'a Table, &'a ForeignKey)>) {
    let mut graph = DependencyGraph::new();
    for table in tables {
        graph.add_table(&table.name);
        for fk in &table.foreign_keys {
            graph.add_dependency(&table.name, &fk.name, &fk.referenced_table);
        }
    }
    let load = graph.load_order();
    let find = |name: &str| tables.iter().copied().find(|t| t.name == name);

    let ordered = load.tables.iter().filter_map(|name| find(name.as_str())).collect();
    let deferred = load
        .deferred
        .iter()
        .filter_map(|edge| {
            let table = find(edge.table.as_str())?;
            let fk = table.foreign_keys.iter().find(|fk| fk.name == edge.foreign_key)?;
            Some((table, fk))
        })
        .collect();
    (ordered, deferred)
}

/// Per-call generation settings.
struct Context<'a> {
    dialect: &'static dyn EngineDialect,
    source_engine: Engine,
    schema: Option<&'a str>,
}

impl Context<'_> {
    fn qualify(&self, table: &str) -> String {
        self.dialect.qualify(self.schema, table)
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    fn same_family(&self) -> bool {
        self.source_engine.shares_native_types(self.dialect.engine())
    }

    /// Column type without auto-increment handling.
    fn column_type(&self, column: &Column) -> String {
        if self.same_family() && !column.native_type.is_empty() {
            column.native_type.clone()
        } else {
            self.dialect.map_type(&column.data_type)
        }
    }

    /// Default clause body, when the default can be carried to the target.
    ///
    /// Literals and the current-time keywords travel everywhere; other
    /// expressions only between engines of the same family.
    fn default_sql(&self, column: &Column) -> Option<String> {
        if column.is_auto_increment {
            return None;
        }
        let value = column.default_value.as_deref()?.trim();
        let upper = value.to_ascii_uppercase();
        match upper.as_str() {
            "TRUE" => return Some(self.dialect.render_bool(true).to_string()),
            "FALSE" => return Some(self.dialect.render_bool(false).to_string()),
            "NULL" | "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME" => return Some(upper),
            _ => {}
        }
        if is_literal(value) {
            return Some(value.to_string());
        }
        self.same_family().then(|| format!("({value})"))
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut ty = self.column_type(column);
        let mut attribute = None;
        if column.is_auto_increment {
            match self.dialect.auto_increment_type(&column.data_type) {
                Some(serial) => ty = serial,
                None if !self.dialect.auto_increment_requires_inline_key() => {
                    attribute = self.dialect.auto_increment_attribute();
                }
                None => {}
            }
        }

        let mut parts = vec![self.quote(&column.name), ty];
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = self.default_sql(column) {
            parts.push(format!("DEFAULT {default}"));
        }
        if let Some(attribute) = attribute {
            parts.push(attribute.to_string());
        }
        parts.join(" ")
    }

    fn create_table(&self, table: &Table, name: &str) -> String {
        let pk = table.primary_key();
        let inline_key = match pk.as_slice() {
            [only] if self.dialect.auto_increment_requires_inline_key() => table
                .get_column(only)
                .is_some_and(|c| c.is_auto_increment && c.data_type == "integer")
                .then_some(only.as_str()),
            _ => None,
        };

        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|column| match inline_key {
                Some(key) if key == column.name => format!(
                    "{} INTEGER PRIMARY KEY {}",
                    self.quote(&column.name),
                    self.dialect.auto_increment_attribute().unwrap_or_default()
                )
                .trim_end()
                .to_string(),
                _ => self.column_definition(column),
            })
            .collect();

        if !pk.is_empty() && inline_key.is_none() {
            lines.push(format!("PRIMARY KEY ({})", self.dialect.quote_list(&pk)));
        }

        // Uniqueness recorded only on the column (no index of its own).
        for column in &table.columns {
            let covered = table
                .secondary_indexes()
                .any(|i| i.is_unique && i.columns.len() == 1 && i.columns[0] == column.name);
            if column.is_unique && !column.is_primary_key && !covered {
                lines.push(format!("UNIQUE ({})", self.quote(&column.name)));
            }
        }

        if !self.dialect.supports_alter_foreign_keys() {
            for fk in &table.foreign_keys {
                lines.push(self.foreign_key_clause(fk, true));
            }
        }

        format!(
            "CREATE TABLE {} (\n    {}\n){};",
            self.qualify(name),
            lines.join(",\n    "),
            self.dialect.create_table_suffix()
        )
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {};", self.qualify(table))
    }

    fn foreign_key_clause(&self, fk: &ForeignKey, inline: bool) -> String {
        let referenced = if inline {
            self.quote(&fk.referenced_table)
        } else {
            let schema = fk
                .referenced_schema
                .as_deref()
                .filter(|_| self.same_family())
                .or(self.schema);
            self.dialect.qualify(schema, &fk.referenced_table)
        };
        self.dialect.foreign_key_clause(fk, &referenced)
    }

    fn add_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD {};",
            self.qualify(table),
            self.foreign_key_clause(fk, false)
        )
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        self.dialect.drop_foreign_key(&self.qualify(table), name)
    }

    fn create_index(&self, table: &str, index: &Index) -> String {
        let method = (self.source_engine == self.dialect.engine()).then_some(index.index_type.as_str());
        self.dialect.create_index(
            self.schema,
            table,
            &index.name,
            &index.columns,
            index.is_unique,
            method,
        )
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        self.dialect.drop_index(self.schema, table, name)
    }

    /// Whether a modified table must be rebuilt rather than altered.
    fn needs_rebuild(&self, children: &[&DiffEntry]) -> bool {
        let rebuild_columns = self.dialect.column_alteration() == ColumnAlteration::Rebuild;
        children.iter().any(|e| match (e.object_kind, e.change_type) {
            (ObjectKind::Column, ChangeType::Added) => {
                rebuild_columns
                    && e.after_column().is_some_and(|c| {
                        c.is_primary_key || c.is_unique || (!c.nullable && c.default_value.is_none())
                    })
            }
            (ObjectKind::Column, _) => rebuild_columns,
            (ObjectKind::ForeignKey, _) => !self.dialect.supports_alter_foreign_keys(),
            _ => false,
        })
    }

    /// Recreate `source` under a scratch name, copy shared columns, swap.
    fn rebuild_table(&self, source: &Table, target: &Table) -> Vec<String> {
        let scratch = format!("{REBUILD_PREFIX}{}", source.name);
        let shared: Vec<String> = source
            .columns
            .iter()
            .filter(|c| target.get_column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect();

        let mut stmts = vec![self.create_table(source, &scratch)];
        if !shared.is_empty() {
            let columns = self.dialect.quote_list(&shared);
            stmts.push(format!(
                "INSERT INTO {} ({columns}) SELECT {columns} FROM {};",
                self.qualify(&scratch),
                self.qualify(&source.name)
            ));
        }
        stmts.push(self.drop_table(&source.name));
        stmts.push(format!(
            "ALTER TABLE {} RENAME TO {};",
            self.qualify(&scratch),
            self.quote(&source.name)
        ));
        for index in source.secondary_indexes() {
            stmts.push(self.create_index(&source.name, index));
        }
        stmts
    }

    fn alter_table(&self, source: &Table, target: &Table, children: &[&DiffEntry], phases: &mut Phases) {
        let table = source.name.as_str();
        let qualified = self.qualify(table);

        for entry in children {
            match (entry.object_kind, entry.change_type) {
                (ObjectKind::Column, ChangeType::Added) => {
                    if let Some(column) = entry.after_column() {
                        phases.add_columns.push(format!(
                            "ALTER TABLE {} ADD COLUMN {};",
                            qualified,
                            self.column_definition(column)
                        ));
                    }
                }
                (ObjectKind::Column, ChangeType::Removed) => {
                    if let Some(column) = entry.before_column() {
                        phases.drop_columns.push(format!(
                            "ALTER TABLE {} DROP COLUMN {};",
                            qualified,
                            self.quote(&column.name)
                        ));
                    }
                }
                (ObjectKind::Column, ChangeType::Modified) => {
                    if let Some(column) = entry.after_column() {
                        phases
                            .alter_columns
                            .extend(self.alter_column(&qualified, column, &entry.changes));
                    }
                }
                (ObjectKind::Index, _) => {
                    if let Some(index) = entry.before_index() {
                        phases.drop_indexes.push(self.drop_index(table, &index.name));
                    }
                    if let Some(index) = entry.after_index() {
                        phases.create_indexes.push(self.create_index(table, index));
                    }
                }
                (ObjectKind::ForeignKey, _) => {
                    if let Some(fk) = entry.before_foreign_key() {
                        phases.drop_foreign_keys.push(self.drop_foreign_key(table, &fk.name));
                    }
                    if let Some(fk) = entry.after_foreign_key() {
                        phases.add_foreign_keys.push(self.add_foreign_key(table, fk));
                    }
                }
                (ObjectKind::Table, _) => {}
            }
        }

        let (wanted, current) = (source.primary_key(), target.primary_key());
        if wanted != current {
            if !current.is_empty() {
                let constraint = target.indexes.iter().find(|i| i.is_primary).map(|i| i.name.as_str());
                phases
                    .drop_indexes
                    .push(self.dialect.drop_primary_key(&qualified, table, constraint));
            }
            if !wanted.is_empty() {
                phases.add_primary_keys.push(format!(
                    "ALTER TABLE {} ADD PRIMARY KEY ({});",
                    qualified,
                    self.dialect.quote_list(&wanted)
                ));
            }
        }
    }

    fn alter_column(&self, qualified: &str, column: &Column, changes: &[String]) -> Vec<String> {
        let changed = |attr: &str| changes.iter().any(|c| c == attr);
        match self.dialect.column_alteration() {
            ColumnAlteration::Redefine => {
                if changes.iter().any(|c| c != "isPrimaryKey") {
                    vec![format!(
                        "ALTER TABLE {} MODIFY COLUMN {};",
                        qualified,
                        self.column_definition(column)
                    )]
                } else {
                    Vec::new()
                }
            }
            ColumnAlteration::PerAttribute => {
                let name = self.quote(&column.name);
                let mut stmts = Vec::new();
                if changed("dataType") {
                    stmts.push(self.dialect.alter_column_type(
                        qualified,
                        &column.name,
                        &self.column_type(column),
                    ));
                }
                if changed("nullable") {
                    let action = if column.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
                    stmts.push(format!("ALTER TABLE {qualified} ALTER COLUMN {name} {action};"));
                }
                if changed("defaultValue") {
                    stmts.push(match self.default_sql(column) {
                        Some(default) => {
                            format!("ALTER TABLE {qualified} ALTER COLUMN {name} SET DEFAULT {default};")
                        }
                        None => format!("ALTER TABLE {qualified} ALTER COLUMN {name} DROP DEFAULT;"),
                    });
                }
                stmts
            }
            ColumnAlteration::Rebuild => Vec::new(),
        }
    }
}

/// A quoted string or a number.
fn is_literal(value: &str) -> bool {
    (value.len() >= 2 && value.starts_with('\'') && value.ends_with('\''))
        || value.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_schemas;
    use dbsync_core::{ReferentialAction, Schema};
    use pretty_assertions::assert_eq;

    fn schema(engine: Engine, tables: Vec<Table>) -> Schema {
        tables
            .into_iter()
            .fold(Schema::new(engine, "public"), Schema::with_table)
    }

    fn users(with_name: bool) -> Table {
        let mut table = Table::new("users").column(Column::new("id", "integer").primary_key());
        if with_name {
            table = table.column(Column::new("name", "text"));
        }
        table
    }

    fn customers() -> Table {
        Table::new("customers")
            .column(Column::new("id", "integer").primary_key().auto_increment())
            .column(Column::new("email", "varchar(255)").not_null())
            .index(Index::new("idx_customers_email", vec!["email".to_string()]).unique())
    }

    fn orders() -> Table {
        Table::new("orders")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("customer_id", "integer").not_null())
            .foreign_key(
                ForeignKey::new(
                    "orders_customer_id_fkey",
                    vec!["customer_id".to_string()],
                    "customers",
                    vec!["id".to_string()],
                )
                .unwrap()
                .on_delete(ReferentialAction::Cascade),
            )
    }

    #[test]
    fn test_add_column_postgres() {
        let diff = diff_schemas(
            &schema(Engine::Postgres, vec![users(true)]),
            &schema(Engine::Postgres, vec![users(false)]),
        );
        assert_eq!(
            generate_migration(&diff, Engine::Postgres),
            vec!["ALTER TABLE \"users\" ADD COLUMN \"name\" text;"]
        );
    }

    #[test]
    fn test_empty_diff_generates_nothing() {
        let a = schema(Engine::Postgres, vec![users(true)]);
        assert!(generate_migration(&diff_schemas(&a, &a), Engine::Postgres).is_empty());
    }

    #[test]
    fn test_create_tables_parents_first_then_foreign_keys() {
        let diff = diff_schemas(
            &schema(Engine::Postgres, vec![orders(), customers()]),
            &schema(Engine::Postgres, vec![]),
        );
        let sql = generate_migration(&diff, Engine::Postgres);

        assert_eq!(sql.len(), 4);
        assert!(sql[0].starts_with("CREATE TABLE \"customers\""));
        assert!(sql[0].contains("\"id\" SERIAL NOT NULL"));
        assert!(sql[0].contains("PRIMARY KEY (\"id\")"));
        assert!(sql[1].starts_with("CREATE TABLE \"orders\""));
        assert!(!sql[1].contains("FOREIGN KEY"));
        assert_eq!(
            sql[2],
            "CREATE UNIQUE INDEX \"idx_customers_email\" ON \"customers\" (\"email\");"
        );
        assert_eq!(
            sql[3],
            "ALTER TABLE \"orders\" ADD CONSTRAINT \"orders_customer_id_fkey\" FOREIGN KEY \
             (\"customer_id\") REFERENCES \"customers\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION;"
        );
    }

    #[test]
    fn test_sqlite_inline_foreign_keys_and_autoincrement() {
        let diff = diff_schemas(
            &schema(Engine::Sqlite, vec![orders(), customers()]),
            &schema(Engine::Sqlite, vec![]),
        );
        let sql = generate_migration(&diff, Engine::Sqlite);

        assert_eq!(sql.len(), 3);
        assert!(sql[0].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(!sql[0].contains("PRIMARY KEY (\"id\")"));
        assert!(sql[1].contains(
            "CONSTRAINT \"orders_customer_id_fkey\" FOREIGN KEY (\"customer_id\") REFERENCES \"customers\" (\"id\")"
        ));
        assert!(sql[2].starts_with("CREATE UNIQUE INDEX"));
    }

    #[test]
    fn test_sqlite_rebuilds_on_column_change() {
        let mut changed = users(true);
        changed.columns[1] = Column::new("name", "varchar(80)").not_null();
        changed = changed.index(Index::new("idx_users_name", vec!["name".to_string()]));
        let diff = diff_schemas(
            &schema(Engine::Sqlite, vec![changed]),
            &schema(Engine::Sqlite, vec![users(true)]),
        );
        let sql = MigrationGenerator::new()
            .with_schema("main")
            .generate(&diff, Engine::Sqlite);

        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"main\".\"_dbsync_new_users\" (\n    \"id\" integer NOT NULL,\n    \
                 \"name\" varchar(80) NOT NULL,\n    PRIMARY KEY (\"id\")\n);"
                    .to_string(),
                "INSERT INTO \"main\".\"_dbsync_new_users\" (\"id\", \"name\") SELECT \"id\", \"name\" \
                 FROM \"main\".\"users\";"
                    .to_string(),
                "DROP TABLE \"main\".\"users\";".to_string(),
                "ALTER TABLE \"main\".\"_dbsync_new_users\" RENAME TO \"users\";".to_string(),
                "CREATE INDEX \"main\".\"idx_users_name\" ON \"users\" (\"name\");".to_string(),
            ]
        );
    }

    #[test]
    fn test_phase_ordering() {
        let mut source_orders = orders();
        source_orders.foreign_keys.clear();
        source_orders = source_orders
            .column(Column::new("total", "decimal(10,2)"))
            .index(Index::new("idx_orders_total", vec!["total".to_string()]));
        source_orders.columns.retain(|c| c.name != "customer_id");

        let diff = diff_schemas(
            &schema(Engine::Postgres, vec![source_orders]),
            &schema(Engine::Postgres, vec![orders(), customers()]),
        );
        let sql = generate_migration(&diff, Engine::Postgres);
        let position = |needle: &str| {
            sql.iter()
                .position(|s| s.contains(needle))
                .unwrap_or_else(|| panic!("missing {needle} in {sql:#?}"))
        };

        let drop_fk = position("DROP CONSTRAINT \"orders_customer_id_fkey\"");
        let add_col = position("ADD COLUMN \"total\"");
        let drop_col = position("DROP COLUMN \"customer_id\"");
        let drop_table = position("DROP TABLE \"customers\"");
        let create_idx = position("CREATE INDEX \"idx_orders_total\"");
        assert!(drop_fk < drop_col);
        assert!(drop_fk < drop_table);
        assert!(add_col < create_idx);
        assert!(drop_col < drop_table);
    }

    #[test]
    fn test_cross_engine_types_and_defaults() {
        let source = schema(
            Engine::Postgres,
            vec![
                Table::new("flags")
                    .column(
                        Column::new("active", "boolean")
                            .native_type("bool")
                            .default_value("TRUE"),
                    )
                    .column(
                        Column::new("label", "varchar(40)")
                            .native_type("character varying(40)")
                            .default_value("'none'"),
                    )
                    .column(
                        Column::new("token", "uuid").default_value("gen_random_uuid()"),
                    ),
            ],
        );
        let diff = diff_schemas(&source, &Schema::new(Engine::MySql, "shop"));
        let sql = generate_migration(&diff, Engine::MySql);

        assert_eq!(
            sql,
            vec![
                "CREATE TABLE `flags` (\n    `active` TINYINT(1) DEFAULT 1,\n    \
                 `label` VARCHAR(40) DEFAULT 'none',\n    `token` CHAR(36)\n) \
                 ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_postgres_alter_column_and_primary_key() {
        let source = schema(
            Engine::Postgres,
            vec![
                Table::new("tags")
                    .column(Column::new("id", "bigint").primary_key())
                    .column(Column::new("slug", "varchar(50)").not_null().default_value("'x'")),
            ],
        );
        let target = schema(
            Engine::Postgres,
            vec![
                Table::new("tags")
                    .column(Column::new("id", "bigint").not_null())
                    .column(Column::new("slug", "text").primary_key())
                    .index(Index::new("tags_pk", vec!["slug".to_string()]).primary()),
            ],
        );
        let sql = generate_migration(&diff_schemas(&source, &target), Engine::Postgres);

        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"tags\" DROP CONSTRAINT \"tags_pk\";",
                "ALTER TABLE \"tags\" ALTER COLUMN \"slug\" TYPE varchar(50) USING \"slug\"::varchar(50);",
                "ALTER TABLE \"tags\" ALTER COLUMN \"slug\" SET DEFAULT 'x';",
                "ALTER TABLE \"tags\" ADD PRIMARY KEY (\"id\");",
            ]
        );
    }

    #[test]
    fn test_mysql_redefines_columns() {
        let source = schema(
            Engine::MySql,
            vec![Table::new("t").column(Column::new("a", "varchar(20)").native_type("varchar(20)").not_null())],
        );
        let target = schema(
            Engine::MySql,
            vec![Table::new("t").column(Column::new("a", "varchar(10)").native_type("varchar(10)"))],
        );
        let sql = MigrationGenerator::new()
            .with_schema("shop")
            .generate(&diff_schemas(&source, &target), Engine::MySql);
        assert_eq!(
            sql,
            vec!["ALTER TABLE `shop`.`t` MODIFY COLUMN `a` varchar(20) NOT NULL;"]
        );
    }

    #[test]
    fn test_dropped_table_releases_kept_columns_first() {
        let kept = Table::new("customers")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("legacy", "integer"));
        let dropped = Table::new("orders")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("legacy_id", "integer"))
            .foreign_key(
                ForeignKey::new(
                    "orders_legacy_fkey",
                    vec!["legacy_id".to_string()],
                    "customers",
                    vec!["legacy".to_string()],
                )
                .unwrap(),
            );
        let source = schema(
            Engine::Postgres,
            vec![Table::new("customers").column(Column::new("id", "integer").primary_key())],
        );
        let target = schema(Engine::Postgres, vec![kept, dropped]);
        let sql = generate_migration(&diff_schemas(&source, &target), Engine::Postgres);
        let position = |needle: &str| {
            sql.iter()
                .position(|s| s.contains(needle))
                .unwrap_or_else(|| panic!("missing {needle} in {sql:#?}"))
        };

        let drop_fk = position("ALTER TABLE \"orders\" DROP CONSTRAINT \"orders_legacy_fkey\";");
        assert_eq!(drop_fk, 0);
        assert!(drop_fk < position("DROP COLUMN \"legacy\""));
        assert!(position("DROP COLUMN \"legacy\"") < position("DROP TABLE \"orders\""));
    }

    #[test]
    fn test_dropped_table_cycle_opened_first() {
        let a = Table::new("a")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("b_id", "integer"))
            .foreign_key(
                ForeignKey::new("a_b_fkey", vec!["b_id".to_string()], "b", vec!["id".to_string()])
                    .unwrap(),
            );
        let b = Table::new("b")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("a_id", "integer"))
            .foreign_key(
                ForeignKey::new("b_a_fkey", vec!["a_id".to_string()], "a", vec!["id".to_string()])
                    .unwrap(),
            );
        let diff = diff_schemas(
            &Schema::new(Engine::Postgres, "public"),
            &schema(Engine::Postgres, vec![a, b]),
        );
        let sql = generate_migration(&diff, Engine::Postgres);
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"b\" DROP CONSTRAINT \"b_a_fkey\";",
                "DROP TABLE \"a\";",
                "DROP TABLE \"b\";",
            ]
        );
    }
}
