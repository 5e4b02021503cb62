//! Configuration module for ridewire-server.
//!
//! Handles loading configuration from the TOML file and CLI arguments and
//! validating it before it reaches the dispatch core.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{LoadedConfig, ServerConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file (a missing file means all defaults)
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the runtime configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str::<FileConfig>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.config_path.display(),
                    "Config file not found, using defaults"
                );
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            dispatch: file_config.dispatch.to_runtime(),
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

const MAX_RETRY_INTERVAL_SECS: u64 = 3_600;
const MAX_SEARCH_ATTEMPTS: u32 = 1_000;

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let dispatch = &config.dispatch;
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_owned()));

    if !dispatch.search_radius_m.is_finite() || dispatch.search_radius_m <= 0.0 {
        return invalid("dispatch.search_radius_m must be a positive number");
    }
    if !(1..=MAX_RETRY_INTERVAL_SECS).contains(&dispatch.retry_interval_secs) {
        return invalid("dispatch.retry_interval_secs must be between 1 and 3600");
    }
    if !(1..=MAX_SEARCH_ATTEMPTS).contains(&dispatch.max_search_attempts) {
        return invalid("dispatch.max_search_attempts must be between 1 and 1000");
    }
    if dispatch.scheduler_tick_ms < 10 {
        return invalid("dispatch.scheduler_tick_ms must be at least 10");
    }
    let retry_interval_ms = dispatch.retry_interval_secs.checked_mul(1_000);
    if retry_interval_ms.is_none_or(|ms| dispatch.scheduler_tick_ms > ms) {
        return invalid("dispatch.scheduler_tick_ms must not exceed the retry interval");
    }
    if dispatch.outbound_buffer == 0 {
        return invalid("dispatch.outbound_buffer must be at least 1");
    }
    if !dispatch.average_speed_kmh.is_finite() || dispatch.average_speed_kmh <= 0.0 {
        return invalid("dispatch.average_speed_kmh must be a positive number");
    }
    Ok(())
}
