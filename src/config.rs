// ⚙️ Configuration - TOML file with LOFT_* environment overrides
//
// [server]   host, port
// [database] path
// [logging]  level (EnvFilter syntax), json

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// File the settings came from; `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, created on first start
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// e.g. "info" or "loft_ledger=debug,tower_http=info"
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "loft.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load `path` (missing file → defaults), then apply environment overrides.
///
/// - `LOFT_HOST` → `server.host`
/// - `LOFT_PORT` → `server.port`
/// - `LOFT_DB_PATH` → `database.path`
/// - `LOFT_LOG_LEVEL` → `logging.level`
/// - `LOFT_LOG_JSON` → `logging.json` ("true" or "1")
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => Config {
                source: Some(p.to_path_buf()),
                ..toml::from_str::<Config>(&contents)?
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };
    Ok(apply_overrides(config, |key| std::env::var(key).ok()))
}

/// Overrides read through `lookup`; unparsable values are ignored
pub fn apply_overrides<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("LOFT_HOST").and_then(|h| h.parse().ok()) {
        config.server.host = host;
    }
    if let Some(port) = lookup("LOFT_PORT").and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }
    if let Some(path) = lookup("LOFT_DB_PATH") {
        config.database.path = path;
    }
    if let Some(level) = lookup("LOFT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("LOFT_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    config
}

/// Install the global subscriber; an invalid filter falls back to "info".
/// Reports where the settings came from once logging is up.
pub fn init_tracing(config: &Config) {
    let logging = &config.logging;
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match &config.source {
        Some(path) => tracing::info!(path = %path.display(), "config loaded"),
        None => tracing::info!("no config file found, using defaults"),
    }
}
