//! Database introspection.
//!
//! A [`CatalogReader`] per engine issues catalog queries through a
//! [`ConnectionHandle`] and returns model objects; [`SchemaBuilder`] applies
//! the engine-independent cleanup (primary/unique flags, implicit index
//! removal, stable ordering) and produces a [`Schema`] snapshot.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlCatalog;
pub use postgres::PostgresCatalog;
pub use sqlite::SqliteCatalog;

use async_trait::async_trait;
use dbsync_core::{
    Column, ConnectionHandle, Engine, ForeignKey, Index, ReferentialAction, Row, RowExt, Schema,
    SyncError, SyncResult,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::history::HISTORY_TABLE;

/// Configuration for introspection.
#[derive(Debug, Clone)]
pub struct IntrospectionOptions {
    /// Tables to include (empty = all).
    pub include_tables: Vec<String>,
    /// Tables to exclude.
    pub exclude_tables: Vec<String>,
}

impl Default for IntrospectionOptions {
    fn default() -> Self {
        Self {
            include_tables: Vec::new(),
            exclude_tables: vec![HISTORY_TABLE.to_string()],
        }
    }
}

impl IntrospectionOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Include only these tables.
    pub fn include_tables(mut self, tables: Vec<String>) -> Self {
        self.include_tables = tables;
        self
    }

    /// Exclude these tables in addition to the history table.
    pub fn exclude_tables(mut self, tables: Vec<String>) -> Self {
        self.exclude_tables.extend(tables);
        self
    }

    /// Check if a table should be included.
    pub fn should_include_table(&self, name: &str) -> bool {
        if self.exclude_tables.iter().any(|t| t == name) {
            return false;
        }
        self.include_tables.is_empty() || self.include_tables.iter().any(|t| t == name)
    }
}

/// Per-engine catalog access.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// User-visible schemas (databases for MySQL, attached databases for SQLite).
    async fn list_schemas(&self, conn: &ConnectionHandle) -> SyncResult<Vec<String>>;

    /// Base tables in a schema.
    async fn list_tables(&self, conn: &ConnectionHandle, schema: &str) -> SyncResult<Vec<String>>;

    /// Columns of a table in ordinal order.
    async fn read_columns(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<Column>>;

    /// Indexes of a table, including the primary key index.
    async fn read_indexes(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<Index>>;

    /// Foreign keys declared on a table.
    async fn read_foreign_keys(
        &self,
        conn: &ConnectionHandle,
        schema: &str,
        table: &str,
    ) -> SyncResult<Vec<ForeignKey>>;
}

static POSTGRES_CATALOG: PostgresCatalog = PostgresCatalog;
static MYSQL_CATALOG: MySqlCatalog = MySqlCatalog;
static SQLITE_CATALOG: SqliteCatalog = SqliteCatalog;

/// The catalog reader for an engine.
pub fn catalog_reader(engine: Engine) -> &'static dyn CatalogReader {
    match engine {
        Engine::Postgres => &POSTGRES_CATALOG,
        Engine::MySql | Engine::MariaDb => &MYSQL_CATALOG,
        Engine::Sqlite => &SQLITE_CATALOG,
    }
}

/// Reads live schemas into the normalized model.
#[derive(Debug, Clone, Default)]
pub struct SchemaIntrospector {
    options: IntrospectionOptions,
}

impl SchemaIntrospector {
    /// Create an introspector with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an introspector with custom options.
    pub fn with_options(options: IntrospectionOptions) -> Self {
        Self { options }
    }

    /// Get the options.
    pub fn options(&self) -> &IntrospectionOptions {
        &self.options
    }

    /// List schemas visible through a connection.
    pub async fn list_schemas(&self, conn: &ConnectionHandle) -> SyncResult<Vec<String>> {
        catalog_reader(conn.engine())
            .list_schemas(conn)
            .await
            .map_err(into_introspection)
    }

    /// Read one schema.
    ///
    /// `schema` defaults to the connection's preferred schema, its database
    /// for MySQL/MariaDB, or the engine default.
    pub async fn introspect(
        &self,
        conn: &ConnectionHandle,
        schema: Option<&str>,
    ) -> SyncResult<Schema> {
        let schema_name = conn.info().resolve_schema(schema)?;
        let reader = catalog_reader(conn.engine());
        debug!(connection = %conn.id(), schema = %schema_name, "Introspecting schema");

        let tables = reader
            .list_tables(conn, &schema_name)
            .await
            .map_err(into_introspection)?;
        if tables.is_empty() {
            let schemas = self.list_schemas(conn).await?;
            if !schemas.iter().any(|s| *s == schema_name) {
                return Err(SyncError::introspection(format!(
                    "schema '{}' does not exist on connection '{}'",
                    schema_name,
                    conn.info().name
                )));
            }
        }

        let mut builder = SchemaBuilder::new(conn.engine(), schema_name.clone());
        for table in tables {
            if !self.options.should_include_table(&table) {
                continue;
            }
            let columns = reader
                .read_columns(conn, &schema_name, &table)
                .await
                .map_err(into_introspection)?;
            let indexes = reader
                .read_indexes(conn, &schema_name, &table)
                .await
                .map_err(into_introspection)?;
            let foreign_keys = reader
                .read_foreign_keys(conn, &schema_name, &table)
                .await
                .map_err(into_introspection)?;
            builder = builder.with_table(TableParts {
                name: table,
                columns,
                indexes,
                foreign_keys,
            });
        }

        let schema = builder.build()?;
        info!(
            connection = %conn.id(),
            schema = %schema.schema_name,
            tables = schema.tables.len(),
            "Schema introspected"
        );
        Ok(schema)
    }
}

/// Catalog query failures surface as introspection errors; connection
/// failures keep their class.
fn into_introspection(e: SyncError) -> SyncError {
    match e {
        SyncError::Execution { statement, message } => SyncError::introspection(match statement {
            Some(sql) => format!("{message} (catalog query: {})", sql.trim()),
            None => message,
        }),
        other => other,
    }
}

/// Raw pieces of one table as read from the catalog.
#[derive(Debug, Clone, Default)]
pub struct TableParts {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Assembles catalog pieces into a schema snapshot.
#[derive(Debug)]
pub struct SchemaBuilder {
    engine: Engine,
    schema_name: String,
    tables: Vec<TableParts>,
}

impl SchemaBuilder {
    /// Create a new schema builder.
    pub fn new(engine: Engine, schema_name: impl Into<String>) -> Self {
        Self {
            engine,
            schema_name: schema_name.into(),
            tables: Vec::new(),
        }
    }

    /// Add one table's catalog pieces.
    pub fn with_table(mut self, table: TableParts) -> Self {
        self.tables.push(table);
        self
    }

    /// Build the schema from the collected information.
    pub fn build(self) -> SyncResult<Schema> {
        let mut schema = Schema::new(self.engine, self.schema_name);
        let mut parts = self.tables;
        parts.sort_by(|a, b| a.name.cmp(&b.name));

        for mut part in parts {
            part.columns.sort_by_key(|c| c.ordinal_position);

            if let Some(pk) = part.indexes.iter().find(|i| i.is_primary) {
                for column in part.columns.iter_mut() {
                    if pk.columns.contains(&column.name) {
                        column.is_primary_key = true;
                        column.nullable = false;
                    }
                }
            }

            for index in part.indexes.iter().filter(|i| i.is_unique && !i.is_primary) {
                if let [only] = index.columns.as_slice()
                    && let Some(column) = part.columns.iter_mut().find(|c| c.name == *only)
                {
                    column.is_unique = true;
                }
            }

            if self.engine.schema_is_database() {
                // InnoDB creates a backing index per FK, named after it.
                let fks = &part.foreign_keys;
                part.indexes.retain(|i| {
                    i.is_unique
                        || !fks
                            .iter()
                            .any(|fk| fk.name == i.name && fk.columns.starts_with(&i.columns))
                });
            }

            part.indexes.sort_by(|a, b| a.name.cmp(&b.name));
            part.foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));

            let mut table = dbsync_core::Table::new(part.name);
            table.columns = part.columns;
            table.indexes = part.indexes;
            table.foreign_keys = part.foreign_keys;
            schema.add_table(table)?;
        }

        schema.validate()?;
        Ok(schema)
    }
}

/// Quote a catalog lookup value as a string literal.
pub(crate) fn literal(conn: &ConnectionHandle, value: &str) -> String {
    conn.dialect().render_value(&Value::from(value))
}

/// Group FK rows (one per column, ordered by constraint then position)
/// into foreign keys.
pub(crate) fn group_foreign_keys(rows: &[Row], own_schema: &str) -> SyncResult<Vec<ForeignKey>> {
    let mut grouped: indexmap::IndexMap<String, Vec<&Row>> = indexmap::IndexMap::new();
    for row in rows {
        let name = row.str_value("constraint_name").unwrap_or_default();
        grouped.entry(name).or_default().push(row);
    }

    let mut fks = Vec::with_capacity(grouped.len());
    for (name, rows) in grouped {
        let Some(first) = rows.first() else { continue };
        let columns = rows
            .iter()
            .filter_map(|r| r.str_value("column_name"))
            .collect();
        let referenced_columns = rows
            .iter()
            .filter_map(|r| r.str_value("referenced_column"))
            .collect();
        let referenced_table = first.str_value("referenced_table").unwrap_or_default();

        let mut fk = ForeignKey::new(name, columns, referenced_table, referenced_columns)?
            .on_delete(ReferentialAction::parse(
                &first.str_value("delete_rule").unwrap_or_default(),
            ))
            .on_update(ReferentialAction::parse(
                &first.str_value("update_rule").unwrap_or_default(),
            ));
        fk.referenced_schema = first
            .str_value("referenced_schema")
            .filter(|s| s != own_schema);
        fks.push(fk);
    }
    Ok(fks)
}

/// Normalize a catalog default expression.
///
/// Casts and wrapping parentheses are stripped, `NULL` becomes `None`, the
/// current-time functions collapse to their SQL-standard keywords and
/// boolean defaults become `TRUE`/`FALSE`.
pub fn normalize_default(raw: Option<&str>, data_type: &str) -> Option<String> {
    let mut value = raw?.trim().to_string();

    loop {
        let before = value.clone();
        if let Some(pos) = value.rfind("::")
            && !value[pos..].contains('\'')
        {
            value = value[..pos].trim().to_string();
        }
        if value.starts_with('(') && value.ends_with(')') && balanced(&value[1..value.len() - 1]) {
            value = value[1..value.len() - 1].trim().to_string();
        }
        if value == before {
            break;
        }
    }

    if value.is_empty() || value.eq_ignore_ascii_case("null") {
        return None;
    }

    let upper = value.to_ascii_uppercase();
    let function = upper.split('(').next().unwrap_or_default().trim();
    match function {
        "NOW" | "CURRENT_TIMESTAMP" | "LOCALTIMESTAMP" | "TRANSACTION_TIMESTAMP" => {
            return Some("CURRENT_TIMESTAMP".to_string());
        }
        "CURRENT_DATE" | "CURDATE" => return Some("CURRENT_DATE".to_string()),
        "CURRENT_TIME" | "CURTIME" => return Some("CURRENT_TIME".to_string()),
        _ => {}
    }

    if data_type == "boolean" {
        match upper.trim_matches('\'') {
            "TRUE" | "T" | "1" | "B'1'" | "YES" | "Y" => return Some("TRUE".to_string()),
            "FALSE" | "F" | "0" | "B'0'" | "NO" | "N" => return Some("FALSE".to_string()),
            _ => {}
        }
    }

    Some(value)
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
