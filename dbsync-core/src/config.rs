//! Configuration file parsing for `dbsync.toml`.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. String values may reference environment variables as
//! `${VAR_NAME}`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "dbsync.toml";

/// Main configuration structure for `dbsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Orchestration settings.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Defaults for incremental table sync.
    #[serde(default)]
    pub sync: SyncDefaults,

    /// Defaults for dump & restore.
    #[serde(default)]
    pub dump: DumpDefaults,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> SyncResult<Self> {
        let expanded = expand_env_vars(content);
        let config: Self =
            toml::from_str(&expanded).map_err(|e| SyncError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the engine.
    pub fn validate(&self) -> SyncResult<()> {
        if self.engine.max_concurrent_targets == 0 {
            return Err(SyncError::config("engine.max_concurrent_targets must be at least 1"));
        }
        if self.sync.batch_size == 0 {
            return Err(SyncError::config("sync.batch_size must be at least 1"));
        }
        if self.dump.batch_size == 0 {
            return Err(SyncError::config("dump.batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    /// Targets checked concurrently in a group status run.
    #[serde(default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: usize,

    /// How long cached row counts stay valid, in seconds.
    #[serde(default = "default_row_count_ttl")]
    pub row_count_cache_ttl_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_targets: default_max_concurrent_targets(),
            row_count_cache_ttl_secs: default_row_count_ttl(),
        }
    }
}

fn default_max_concurrent_targets() -> usize {
    4
}

fn default_row_count_ttl() -> u64 {
    1800
}

/// Defaults for incremental table sync.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncDefaults {
    /// Rows per multi-row `INSERT`.
    #[serde(default = "default_sync_batch")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub insert_missing: bool,

    #[serde(default = "default_true")]
    pub update_different: bool,

    /// Destructive; off unless asked for.
    #[serde(default)]
    pub delete_extra: bool,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            batch_size: default_sync_batch(),
            insert_missing: true,
            update_different: true,
            delete_extra: false,
        }
    }
}

fn default_sync_batch() -> usize {
    500
}

fn default_true() -> bool {
    true
}

/// Defaults for dump & restore.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DumpDefaults {
    /// Rows read per page from the source.
    #[serde(default = "default_dump_batch")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub truncate_target: bool,
}

impl Default for DumpDefaults {
    fn default() -> Self {
        Self {
            batch_size: default_dump_batch(),
            truncate_target: true,
        }
    }
}

fn default_dump_batch() -> usize {
    1000
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to JSON.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }

    /// Get the format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

/// Logging settings.
///
/// Environment variables (`DBSYNC_LOG_LEVEL`, `DBSYNC_LOG_FORMAT`) take
/// precedence over these values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`.
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub format: LogFormat,
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Unset variables are left as written.
fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };
    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.engine.max_concurrent_targets, 4);
        assert_eq!(config.engine.row_count_cache_ttl_secs, 1800);
        assert_eq!(config.sync.batch_size, 500);
        assert!(config.sync.insert_missing);
        assert!(!config.sync.delete_extra);
        assert_eq!(config.dump.batch_size, 1000);
        assert!(config.dump.truncate_target);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_empty_is_default() {
        assert_eq!(SyncConfig::parse("").unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
            [engine]
            max_concurrent_targets = 8

            [sync]
            delete_extra = true
            batch_size = 50

            [logging]
            level = "debug"
            format = "compact"
        "#;

        let config = SyncConfig::parse(toml).unwrap();
        assert_eq!(config.engine.max_concurrent_targets, 8);
        assert_eq!(config.engine.row_count_cache_ttl_secs, 1800);
        assert!(config.sync.delete_extra);
        assert!(config.sync.update_different);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SyncConfig::parse("[sync]\ndelete_everything = true\n").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_zero_batch_rejected() {
        assert!(SyncConfig::parse("[dump]\nbatch_size = 0\n").is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("DBSYNC_TEST_LEVEL", "trace");
        }
        let expanded = expand_env_vars("level = \"${DBSYNC_TEST_LEVEL}\" # ${DBSYNC_UNSET_VAR}");
        assert_eq!(expanded, "level = \"trace\" # ${DBSYNC_UNSET_VAR}");
        unsafe {
            std::env::remove_var("DBSYNC_TEST_LEVEL");
        }
    }
}
