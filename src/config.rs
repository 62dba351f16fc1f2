use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;

/// ✅ Global Config stored in `OnceLock`
static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Outbound mail endpoint for new-request notifications.
#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub recipient: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    /// `None` means notifications are only logged.
    pub notify: Option<NotifyConfig>,
    pub app_url: Option<String>,
    pub log_dir: PathBuf,
    pub principal_cache_ttl: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

impl Config {
    /// ✅ Load environment variables and set defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let notify = match optional("NOTIFY_ENDPOINT") {
            Some(endpoint) => Some(NotifyConfig {
                endpoint,
                api_key: optional("NOTIFY_API_KEY"),
                recipient: required("NOTIFY_RECIPIENT")?,
            }),
            None => None,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            bind_addr: parsed("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            notify,
            app_url: optional("APP_URL"),
            log_dir: PathBuf::from(optional("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            principal_cache_ttl: Duration::from_secs(parsed("PRINCIPAL_CACHE_TTL_SECS", 600)?),
        })
    }

    /// ✅ Initialize the global config. The first installed value wins.
    pub fn install(config: Config) -> Arc<Config> {
        CONFIG.get_or_init(|| Arc::new(config)).clone()
    }
}
