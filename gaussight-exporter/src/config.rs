//! Configuration for the database exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use gaussight_common::{Charset, CharsetMap, LoggingConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Database target settings.
    #[serde(default)]
    pub target: TargetConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Query-definition source.
    #[serde(default)]
    pub queries: QueriesConfig,

    /// Scrape behavior.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Label text transcoding.
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Query filtering settings.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user.
    #[serde(default)]
    pub user: Option<String>,

    /// Login password.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Database to connect to (default: "postgres").
    #[serde(default = "default_database")]
    pub database: String,

    /// libpq-style connection string; overrides the fields above.
    #[serde(default, skip_serializing)]
    pub url: Option<String>,

    /// Connect timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
            database: default_database(),
            url: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl TargetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9153").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: HashMap<String, String>,

    /// Prefix of the exporter's built-in metrics (default: "pg").
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_listen() -> String {
    "0.0.0.0:9153".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_namespace() -> String {
    "pg".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: HashMap::new(),
            namespace: default_namespace(),
        }
    }
}

/// Where query definitions are loaded from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueriesConfig {
    /// A definition file or a directory of `*.json5` files.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Scrape configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Deadline of one scrape in seconds (default: 30).
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Maximum definitions executed concurrently (default: 5).
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Render timestamp labels as RFC3339 instead of epoch millis.
    #[serde(default)]
    pub time_to_string: bool,
}

fn default_scrape_timeout() -> u64 {
    30
}

fn default_parallel() -> usize {
    5
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            parallel: default_parallel(),
            time_to_string: false,
        }
    }
}

impl ScrapeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Charset configuration for malformed label text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Fallback charset (default: "GBK").
    #[serde(default)]
    pub default_charset: Charset,

    /// Per-database charsets, overriding discovered encodings.
    #[serde(default)]
    pub databases: HashMap<String, Charset>,
}

impl EncodingConfig {
    /// Build the configured part of the charset map.
    pub fn charset_map(&self) -> CharsetMap {
        let mut map = CharsetMap::new(self.default_charset);
        for (database, charset) in &self.databases {
            map.insert(database.clone(), *charset);
        }
        map
    }
}

/// Query filtering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns for definition names to include (empty = all).
    #[serde(default)]
    pub include_queries: Vec<String>,

    /// Glob patterns for definition names to exclude.
    #[serde(default)]
    pub exclude_queries: Vec<String>,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.scrape.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "scrape.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.scrape.parallel == 0 {
            return Err(ConfigError::Validation(
                "scrape.parallel must be > 0".to_string(),
            ));
        }

        if self.target.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "target.connect_timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }
        if matches!(
            self.prometheus.path.as_str(),
            "/" | "/health" | "/ready" | "/reload"
        ) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.prometheus.path
            )));
        }

        for pattern in self
            .filters
            .include_queries
            .iter()
            .chain(&self.filters.exclude_queries)
        {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "Invalid query filter '{}': {}",
                    pattern, e
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaussight_common::LogFormat;

    #[test]
    fn test_parse_minimal_config() {
        let json = "{}";
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.target.host, "localhost");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.database, "postgres");
        assert_eq!(config.prometheus.listen, "0.0.0.0:9153");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.namespace, "pg");
        assert_eq!(config.scrape.timeout_secs, 30);
        assert_eq!(config.scrape.parallel, 5);
        assert!(!config.scrape.time_to_string);
        assert_eq!(config.encoding.default_charset, Charset::Gbk);
        assert!(config.queries.path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            target: {
                host: "10.0.0.5",
                port: 26000,
                user: "monitor",
                password: "secret",
                database: "omm",
                connect_timeout_secs: 3,
            },
            prometheus: {
                listen: "127.0.0.1:9187",
                path: "/gauss/metrics",
                namespace: "gauss",
                default_labels: {
                    environment: "production",
                },
            },
            queries: { path: "/etc/gaussight/queries" },
            scrape: { timeout_secs: 10, parallel: 2, time_to_string: true },
            encoding: {
                default_charset: "gb18030",
                databases: { legacy: "GBK", modern: "UTF8" },
            },
            filters: {
                include_queries: ["pg_*"],
                exclude_queries: ["pg_lock*"],
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.target.host, "10.0.0.5");
        assert_eq!(config.target.port, 26000);
        assert_eq!(config.target.user.as_deref(), Some("monitor"));
        assert_eq!(config.target.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.prometheus.listen, "127.0.0.1:9187");
        assert_eq!(config.prometheus.namespace, "gauss");
        assert_eq!(
            config.prometheus.default_labels.get("environment"),
            Some(&"production".to_string())
        );
        assert_eq!(
            config.queries.path,
            Some(PathBuf::from("/etc/gaussight/queries"))
        );
        assert_eq!(config.scrape.timeout(), Duration::from_secs(10));
        assert_eq!(config.scrape.parallel, 2);
        assert!(config.scrape.time_to_string);
        assert_eq!(config.filters.include_queries, vec!["pg_*"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let map = config.encoding.charset_map();
        assert_eq!(map.default_charset(), Charset::Gb18030);
        assert_eq!(map.charset_for("legacy"), Charset::Gbk);
        assert_eq!(map.charset_for("modern"), Charset::Utf8);
        assert_eq!(map.charset_for("other"), Charset::Gb18030);
    }

    #[test]
    fn test_password_not_serialized() {
        let json = r#"{ target: { password: "secret", url: "host=db password=secret" } }"#;
        let config = ExporterConfig::parse(json).unwrap();

        let out = serde_json::to_string(&config).unwrap();
        assert!(!out.contains("secret"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            prometheus: { listen: "not-an-address" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            prometheus: { path: "no-leading-slash" }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_log_level() {
        let result = ExporterConfig::parse(r#"{ logging: { level: "gaussight=loud" } }"#);
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_validate_reserved_path() {
        let result = ExporterConfig::parse(r#"{ prometheus: { path: "/health" } }"#);
        assert!(result.unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_validate_zero_parallel() {
        let result = ExporterConfig::parse(r#"{ scrape: { parallel: 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let result = ExporterConfig::parse(r#"{ scrape: { timeout_secs: 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_charset_rejected() {
        let result = ExporterConfig::parse(r#"{ encoding: { default_charset: "LATIN1" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_filter_pattern() {
        let result = ExporterConfig::parse(r#"{ filters: { include_queries: ["pg_[" ] } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid query filter")
        );
    }
}
