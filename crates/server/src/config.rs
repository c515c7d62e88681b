use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::Duration;
use serde::Deserialize;
use std::time::Duration as StdDuration;
use thiserror::Error;

use gavel_core::types::{config::EngineConfig, primitives::Amount};

pub const DEFAULT_CONFIG_PATH: &str = "gavel.toml";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GavelConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Engine tunables in plain units (integer currency, seconds, milliseconds).
/// Omitted keys take the engine defaults.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub min_increment: Option<u64>,
    pub max_amount: Option<u64>,
    pub snipe_threshold_secs: Option<i64>,
    pub snipe_extension_secs: Option<i64>,
    pub max_remaining_secs: Option<i64>,
    pub extension_ceiling_secs: Option<i64>,
    pub deal_confirm_window_secs: Option<i64>,
    pub result_ttl_secs: Option<u64>,
    pub submit_wait_ms: Option<u64>,
    pub close_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse toml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn load_config(path: impl AsRef<Path>) -> Result<GavelConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: GavelConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(config)
}

/// Like [`load_config`], but a missing file is not an error: the server runs
/// on defaults unless a config is explicitly present.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<GavelConfig, ConfigError> {
    match load_config(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            Ok(GavelConfig::default())
        }
        Err(error) => Err(error),
    }
}

impl GavelConfig {
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        let section = &self.engine;

        if let Some(value) = section.min_increment {
            config.min_increment = Amount::new(value);
        }
        if let Some(value) = section.max_amount {
            config.max_amount = Amount::new(value);
        }
        if let Some(value) = section.snipe_threshold_secs {
            config.snipe_threshold = Duration::seconds(value);
        }
        if let Some(value) = section.snipe_extension_secs {
            config.snipe_extension = Duration::seconds(value);
        }
        if let Some(value) = section.max_remaining_secs {
            config.max_remaining = Duration::seconds(value);
        }
        if let Some(value) = section.extension_ceiling_secs {
            config.extension_ceiling = Duration::seconds(value);
        }
        if let Some(value) = section.deal_confirm_window_secs {
            config.deal_confirm_window = Duration::seconds(value);
        }
        if let Some(value) = section.result_ttl_secs {
            config.result_ttl = StdDuration::from_secs(value);
        }
        if let Some(value) = section.submit_wait_ms {
            config.submit_wait = StdDuration::from_millis(value);
        }
        if let Some(value) = section.close_retry_delay_ms {
            config.close_retry_delay = StdDuration::from_millis(value);
        }

        config
    }
}
