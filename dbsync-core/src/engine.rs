//! Supported database engines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dialect::{EngineDialect, MariaDbDialect, MySqlDialect, PostgresDialect, SqliteDialect};
use crate::error::SyncError;

/// A database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// PostgreSQL.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL.
    MySql,
    /// MariaDB.
    MariaDb,
    /// SQLite.
    #[serde(alias = "sqlite3")]
    Sqlite,
}

static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;
static MARIADB: MariaDbDialect = MariaDbDialect;
static SQLITE: SqliteDialect = SqliteDialect;

impl Engine {
    /// Every supported engine.
    pub const ALL: [Engine; 4] = [Self::Postgres, Self::MySql, Self::MariaDb, Self::Sqlite];

    /// Get the engine name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::Sqlite => "sqlite",
        }
    }

    /// The SQL dialect for this engine.
    pub fn dialect(&self) -> &'static dyn EngineDialect {
        match self {
            Self::Postgres => &POSTGRES,
            Self::MySql => &MYSQL,
            Self::MariaDb => &MARIADB,
            Self::Sqlite => &SQLITE,
        }
    }

    /// Whether schema and database share one namespace on this engine.
    pub fn schema_is_database(&self) -> bool {
        matches!(self, Self::MySql | Self::MariaDb)
    }

    /// The schema used when the caller does not name one.
    ///
    /// MySQL and MariaDB use the connection's database, so the caller must
    /// supply it; `None` is returned for them.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("public"),
            Self::Sqlite => Some("main"),
            Self::MySql | Self::MariaDb => None,
        }
    }

    /// Whether two engines share a type vocabulary closely enough to reuse
    /// native column types verbatim.
    pub fn shares_native_types(&self, other: Engine) -> bool {
        *self == other || (self.schema_is_database() && other.schema_is_database())
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "mariadb" => Ok(Self::MariaDb),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(SyncError::config(format!("unsupported engine '{other}'"))),
        }
    }
}
