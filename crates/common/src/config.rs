//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Relational database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Bot behaviour.
    #[serde(default)]
    pub bot: BotConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL. Without one the file backend is used.
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a connection before treating the database as unreachable.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// File backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding per-user documents and upload history.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Bot behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Quality labels users may select from.
    #[serde(default = "default_qualities")]
    pub qualities: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            qualities: default_qualities(),
        }
    }
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_connect_timeout() -> u64 {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_qualities() -> Vec<String> {
    ["480p", "720p", "1080p", "4K", "2160p"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `REELCAP_ENV`)
    /// 3. Environment variables with `REELCAP__` prefix
    /// 4. The plain `DATABASE_URL` and `DATA_DIR` variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("REELCAP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("REELCAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("storage.data_dir", std::env::var("DATA_DIR").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("REELCAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
