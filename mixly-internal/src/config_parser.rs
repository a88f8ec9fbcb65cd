use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, ErrorDetails};
use crate::suggestion::SuggestionProviderConfig;
use crate::usage::{MeteringConfig, PremiumConfig};

pub const REDIS_URL_ENV_VAR: &str = "MIXLY_REDIS_URL";
const DEFAULT_REDIS_TIMEOUT_MS: u64 = 250;
const DEFAULT_LOCK_PRUNE_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub metering: MeteringConfig,
    #[serde(default)]
    pub premium: PremiumConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub suggestion_provider: SuggestionProviderConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind_address: Option<SocketAddr>,
    #[serde(default)]
    pub debug: bool,
    /// How often idle per-user lock slots are dropped
    #[serde(default = "default_lock_prune_interval_secs")]
    pub lock_prune_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            debug: false,
            lock_prune_interval_secs: DEFAULT_LOCK_PRUNE_INTERVAL_SECS,
        }
    }
}

fn default_lock_prune_interval_secs() -> u64 {
    DEFAULT_LOCK_PRUNE_INTERVAL_SECS
}

fn default_redis_timeout_ms() -> u64 {
    DEFAULT_REDIS_TIMEOUT_MS
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum StorageConfig {
    #[default]
    Memory,
    Redis {
        /// Falls back to the `MIXLY_REDIS_URL` environment variable
        url: Option<String>,
        #[serde(default = "default_redis_timeout_ms")]
        timeout_ms: u64,
    },
}

impl StorageConfig {
    pub fn redis_timeout(&self) -> Option<Duration> {
        match self {
            StorageConfig::Memory => None,
            StorageConfig::Redis { timeout_ms, .. } => Some(Duration::from_millis(*timeout_ms)),
        }
    }
}

impl Config {
    pub async fn load_and_verify_from_path(path: &Path) -> Result<Config, Error> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file `{}`: {e}", path.display()),
            })
        })?;
        let config = Self::parse(&contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to parse config file `{}`: {e}", path.display()),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML, reporting the dotted path of the offending key on failure.
    fn parse(contents: &str) -> Result<Config, String> {
        let deserializer = toml::Deserializer::new(contents);
        serde_path_to_error::deserialize(deserializer).map_err(|e| {
            let path = e.path().to_string();
            format!("`{path}`: {}", e.into_inner())
        })
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.metering.validate()?;
        self.premium.validate()?;
        if let StorageConfig::Redis { timeout_ms, .. } = &self.storage {
            if *timeout_ms == 0 {
                return Err(Error::new(ErrorDetails::Config {
                    message: "`storage.timeout_ms` must be greater than zero".to_string(),
                }));
            }
        }
        if self.gateway.lock_prune_interval_secs == 0 {
            return Err(Error::new(ErrorDetails::Config {
                message: "`gateway.lock_prune_interval_secs` must be greater than zero"
                    .to_string(),
            }));
        }
        Ok(())
    }
}
