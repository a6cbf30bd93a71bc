use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub utilization: UtilizationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the fleet warehouse lives and how it is attached.
#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    pub path: PathBuf,
    /// Attach a SQLite file through DuckDB's `sqlite_scanner` instead of a
    /// native DuckDB database.
    #[serde(default)]
    pub attach_sqlite: bool,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UtilizationConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_query_timeout() -> u64 {
    30
}
fn default_cache_ttl() -> u64 {
    60
}
fn default_cache_capacity() -> u64 {
    256
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.warehouse.path.as_os_str().is_empty() {
            return Err("warehouse.path must be set. \
                 Set it in config.toml or via CONTRAIL__WAREHOUSE__PATH env var."
                .to_string());
        }
        if self.warehouse.query_timeout_secs == 0 {
            return Err("warehouse.query_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // Load from config file
        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (CONTRAIL__SERVER__PORT=3001, etc.)
        builder = builder.add_source(
            Environment::with_prefix("CONTRAIL")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = parse(
            r#"
            [server]
            host = "127.0.0.1"
            port = 5340

            [warehouse]
            path = "data/fleet.duckdb"
            "#,
        );
        assert!(!config.warehouse.attach_sqlite);
        assert_eq!(config.warehouse.query_timeout_secs, 30);
        assert_eq!(config.utilization.cache_ttl_secs, 60);
        assert_eq!(config.utilization.cache_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = parse(
            r#"
            [server]
            host = "0.0.0.0"
            port = 5340

            [warehouse]
            path = "fleet.db"
            attach_sqlite = true
            query_timeout_secs = 0
            "#,
        );
        assert!(config.warehouse.attach_sqlite);
        let err = config.validate().unwrap_err();
        assert!(err.contains("query_timeout_secs"), "unexpected message: {err}");
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let config = parse(
            r#"
            [server]
            host = "0.0.0.0"
            port = 5340

            [warehouse]
            path = ""
            "#,
        );
        assert!(config.validate().is_err());
    }
}
