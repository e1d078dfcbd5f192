//! Logging setup.
//!
//! dbsync logs through `tracing` at every I/O boundary. Installing a
//! subscriber is left to the application unless the `tracing-subscriber`
//! feature is enabled, in which case [`init`] sets one up from the
//! environment:
//!
//! - `DBSYNC_DEBUG=true|1|yes` enables debug logging
//! - `DBSYNC_LOG_LEVEL=trace|debug|info|warn|error` sets the level
//! - `DBSYNC_LOG_FORMAT=json|pretty|compact` sets the output format (default: json)
//!
//! ```rust,ignore
//! use tracing::{debug, info, warn};
//!
//! debug!(connection = %id, sql = %sql, "Executing statement");
//! info!(table = %table, rows, "Table restored");
//! warn!(table = %table, error = %e, "Table sync failed");
//! ```

use std::env;
use std::sync::Once;

use crate::config::{LogFormat, LoggingConfig};

static INIT: Once = Once::new();

const CRATES: [&str; 6] = [
    "dbsync",
    "dbsync_core",
    "dbsync_migrate",
    "dbsync_data",
    "dbsync_sqlite",
    "dbsync_engine",
];

/// Whether `DBSYNC_DEBUG` is set to a truthy value.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("DBSYNC_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn parse_level(level: &str) -> Option<&'static str> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

/// Resolve the log level: `DBSYNC_LOG_LEVEL`, then the config, then
/// `debug` when `DBSYNC_DEBUG` is set, else `warn`.
pub fn resolve_level(config: &LoggingConfig) -> &'static str {
    env::var("DBSYNC_LOG_LEVEL")
        .ok()
        .as_deref()
        .and_then(parse_level)
        .or_else(|| config.level.as_deref().and_then(parse_level))
        .unwrap_or(if is_debug_enabled() { "debug" } else { "warn" })
}

/// Resolve the output format: `DBSYNC_LOG_FORMAT`, then the config.
pub fn resolve_format(config: &LoggingConfig) -> LogFormat {
    env::var("DBSYNC_LOG_FORMAT")
        .map(|f| LogFormat::parse(&f))
        .unwrap_or(config.format)
}

/// Filter directive covering every dbsync crate.
pub fn filter_directive(level: &str) -> String {
    CRATES
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize logging from the environment.
///
/// Does nothing unless `DBSYNC_DEBUG` or `DBSYNC_LOG_LEVEL` is set.
/// Subsequent calls are no-ops.
pub fn init() {
    if !is_debug_enabled() && env::var("DBSYNC_LOG_LEVEL").is_err() {
        return;
    }
    init_with(&LoggingConfig::default());
}

/// Initialize logging from a `[logging]` section, with environment
/// variables taking precedence.
///
/// Subsequent calls are no-ops.
pub fn init_with(config: &LoggingConfig) {
    INIT.call_once(|| {
        let level = resolve_level(config);
        let format = resolve_format(config);

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(filter_directive(level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));
            let registry = tracing_subscriber::registry().with(filter);
            let installed = match format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };
            if installed.is_ok() {
                tracing::info!(level, format = format.as_str(), "dbsync logging initialized");
            }
        }

        #[cfg(not(feature = "tracing-subscriber"))]
        {
            let _ = (level, format);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some("debug"));
        assert_eq!(parse_level("warning"), Some("warn"));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_config_level_used_without_env() {
        if env::var("DBSYNC_LOG_LEVEL").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: Some("info".into()),
            format: LogFormat::Pretty,
        };
        assert_eq!(resolve_level(&config), "info");
    }

    #[test]
    fn test_filter_directive() {
        let directive = filter_directive("debug");
        assert!(directive.starts_with("dbsync=debug,dbsync_core=debug"));
        assert!(directive.ends_with("dbsync_engine=debug"));
    }
}
