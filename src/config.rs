use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WebSqlite3Error;
use crate::types::IsolationLevel;

/// Settings for each driver handle the pool opens.
///
/// `check_same_thread` is accepted for compatibility and ignored: ownership
/// already guarantees a handle is used by one task at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database file path, or `:memory:` for a private in-memory database.
    pub database: String,
    /// Driver busy timeout in seconds.
    #[serde(default = "default_driver_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub check_same_thread: bool,
    /// Isolation mode used by `BEGIN`; `None` means plain `BEGIN` (DEFERRED).
    #[serde(default)]
    pub isolation_level: Option<IsolationLevel>,
    /// Capacity of the driver's prepared-statement cache.
    #[serde(default = "default_cached_statements")]
    pub cached_statements: usize,
    /// Interpret `database` as a `file:` URI.
    #[serde(default)]
    pub uri: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
            timeout: default_driver_timeout(),
            check_same_thread: false,
            isolation_level: None,
            cached_statements: default_cached_statements(),
            uri: false,
        }
    }
}

/// Pool sizing and lifecycle policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened eagerly and kept through idle eviction.
    pub min_size: usize,
    /// Hard bound on live connections; also the executor's worker count.
    pub max_size: usize,
    /// Retire a connection after this many uses (0 = unlimited).
    pub max_queries: u64,
    /// Idle seconds before the sweep retires a connection (above `min_size`).
    pub max_idle_time: f64,
    /// Seconds to wait for a free connection before `PoolExhausted`.
    pub connection_timeout: f64,
    /// Retire a connection after this age in seconds (0 = never).
    pub pool_recycle: u64,
    /// Log each SQL statement.
    pub echo: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            max_queries: 0,
            max_idle_time: 600.0,
            connection_timeout: 30.0,
            pool_recycle: 3600,
            echo: false,
        }
    }
}

/// Reserved for a future network front-end; accepted and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub charset: String,
    pub autocommit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            charset: "utf8mb4".to_string(),
            autocommit: true,
        }
    }
}

/// Full configuration: driver, pool, and the reserved server block.
///
/// Unknown fields in configuration files are ignored; missing fields take
/// the defaults documented on each section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub pool: PoolConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load a configuration from a JSON or YAML file, dispatching on the
    /// file extension.
    ///
    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` for unreadable files,
    /// unsupported extensions, or malformed content.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WebSqlite3Error> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            other => Err(WebSqlite3Error::Configuration(format!(
                "unsupported configuration extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` if the file is missing or
    /// the JSON is malformed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, WebSqlite3Error> {
        let text = read_config_file(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` if the file is missing or
    /// the YAML is malformed.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, WebSqlite3Error> {
        let text = read_config_file(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` on malformed JSON.
    pub fn from_json_str(text: &str) -> Result<Self, WebSqlite3Error> {
        serde_json::from_str(text)
            .map_err(|e| WebSqlite3Error::Configuration(format!("invalid JSON configuration: {e}")))
    }

    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` on malformed YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self, WebSqlite3Error> {
        serde_yaml::from_str(text)
            .map_err(|e| WebSqlite3Error::Configuration(format!("invalid YAML configuration: {e}")))
    }

    /// Serialize the configuration to pretty-printed JSON.
    ///
    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` if serialization fails.
    pub fn to_json_string(&self) -> Result<String, WebSqlite3Error> {
        serde_json::to_string_pretty(self)
            .map_err(|e| WebSqlite3Error::Configuration(format!("cannot serialize config: {e}")))
    }

    /// Validate field values and cross-field constraints.
    ///
    /// # Errors
    /// Returns `WebSqlite3Error::Configuration` on the first violation.
    pub fn validate(&self) -> Result<(), WebSqlite3Error> {
        if self.connection.database.is_empty() {
            return Err(WebSqlite3Error::Configuration(
                "connection.database must not be empty".into(),
            ));
        }
        if self.pool.max_size == 0 {
            return Err(WebSqlite3Error::Configuration(
                "pool.max_size must be at least 1".into(),
            ));
        }
        if self.pool.min_size > self.pool.max_size {
            return Err(WebSqlite3Error::Configuration(format!(
                "pool.min_size ({}) exceeds pool.max_size ({})",
                self.pool.min_size, self.pool.max_size
            )));
        }
        for (name, value) in [
            ("connection.timeout", self.connection.timeout),
            ("pool.max_idle_time", self.pool.max_idle_time),
            ("pool.connection_timeout", self.pool.connection_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(WebSqlite3Error::Configuration(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn connection_timeout(&self) -> Duration {
        secs(self.pool.connection_timeout)
    }
}

impl PoolConfig {
    pub(crate) fn max_idle(&self) -> Duration {
        secs(self.max_idle_time)
    }

    pub(crate) fn recycle_after(&self) -> Option<Duration> {
        (self.pool_recycle > 0).then(|| Duration::from_secs(self.pool_recycle))
    }
}

impl ConnectionConfig {
    pub(crate) fn busy_timeout(&self) -> Duration {
        secs(self.timeout)
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

fn read_config_file(path: &Path) -> Result<String, WebSqlite3Error> {
    std::fs::read_to_string(path).map_err(|e| {
        WebSqlite3Error::Configuration(format!(
            "cannot read configuration file {}: {e}",
            path.display()
        ))
    })
}

fn default_driver_timeout() -> f64 {
    5.0
}

fn default_cached_statements() -> usize {
    128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.connection.database, ":memory:");
        assert_eq!(config.pool.min_size, 1);
        assert_eq!(config.pool.max_size, 10);
        assert_eq!(config.server.port, 3306);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn unknown_fields_are_ignored_and_missing_fields_defaulted() {
        let config = Config::from_json_str(
            r#"{
                "connection": { "database": "app.db", "timeout": 2.5, "mystery": true },
                "pool": { "max_size": 4 },
                "extra_section": { "x": 1 }
            }"#,
        )
        .expect("parse");
        assert_eq!(config.connection.database, "app.db");
        assert_eq!(config.connection.cached_statements, 128);
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.min_size, 1);
    }

    #[test]
    fn yaml_parses_isolation_level() {
        let config = Config::from_yaml_str(
            "connection:\n  database: app.db\n  isolation_level: IMMEDIATE\n",
        )
        .expect("parse");
        assert_eq!(
            config.connection.isolation_level,
            Some(IsolationLevel::Immediate)
        );
    }

    #[test]
    fn min_size_above_max_size_is_rejected() {
        let mut config = Config::default();
        config.pool.min_size = 8;
        config.pool.max_size = 2;
        assert!(matches!(
            config.validate(),
            Err(WebSqlite3Error::Configuration(_))
        ));
    }

    #[test]
    fn negative_timeouts_are_rejected() {
        let mut config = Config::default();
        config.pool.connection_timeout = -1.0;
        assert!(config.validate().is_err());
    }
}
