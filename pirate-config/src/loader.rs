//! Configuration loading and environment variable handling

use crate::domains::broker::BrokerConfig;
use crate::domains::client::ClientConfig;
use crate::domains::heartbeat::HeartbeatConfig;
use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::worker::WorkerConfig;
use crate::domains::PirateConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "PIRATE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<PirateConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<PirateConfig> {
        let mut config: PirateConfig = if content.trim().is_empty() {
            PirateConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<PirateConfig> {
        let mut config = PirateConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<PirateConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut PirateConfig) -> ConfigResult<()> {
        self.apply_heartbeat_overrides(&mut config.heartbeat)?;
        self.apply_logging_overrides(&mut config.logging)?;

        if self.has_any(&["BROKER_FRONTEND", "BROKER_BACKEND"]) {
            self.apply_broker_overrides(config.broker.get_or_insert_with(BrokerConfig::default))?;
        }

        if self.has_any(&["WORKER_BACKEND", "WORKER_LANGUAGES"]) {
            self.apply_worker_overrides(config.worker.get_or_insert_with(WorkerConfig::default))?;
        }

        if self.has_any(&["CLIENT_FRONTEND", "CLIENT_TIMEOUT_MS", "CLIENT_RETRIES"]) {
            self.apply_client_overrides(config.client.get_or_insert_with(ClientConfig::default))?;
        }

        Ok(())
    }

    /// Apply heartbeat config overrides
    fn apply_heartbeat_overrides(&self, config: &mut HeartbeatConfig) -> ConfigResult<()> {
        if let Ok(interval) = self.get_env_var("HEARTBEAT_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid HEARTBEAT_INTERVAL_MS: {}", e))
            })?;
            config.interval = Duration::from_millis(millis);
        }

        if let Ok(liveness) = self.get_env_var("HEARTBEAT_LIVENESS") {
            config.liveness = liveness.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid HEARTBEAT_LIVENESS: {}", e))
            })?;
        }

        Ok(())
    }

    /// Apply broker config overrides
    fn apply_broker_overrides(&self, config: &mut BrokerConfig) -> ConfigResult<()> {
        if let Ok(frontend) = self.get_env_var("BROKER_FRONTEND") {
            config.frontend = frontend;
        }

        if let Ok(backend) = self.get_env_var("BROKER_BACKEND") {
            config.backend = backend;
        }

        Ok(())
    }

    /// Apply worker config overrides
    fn apply_worker_overrides(&self, config: &mut WorkerConfig) -> ConfigResult<()> {
        if let Ok(backend) = self.get_env_var("WORKER_BACKEND") {
            config.backend = backend;
        }

        if let Ok(languages) = self.get_env_var("WORKER_LANGUAGES") {
            config.supported_languages = languages
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<i64>().map_err(|e| {
                        ConfigError::EnvError(format!("Invalid WORKER_LANGUAGES entry '{}': {}", id, e))
                    })
                })
                .collect::<ConfigResult<Vec<_>>>()?;
        }

        Ok(())
    }

    /// Apply client config overrides
    fn apply_client_overrides(&self, config: &mut ClientConfig) -> ConfigResult<()> {
        if let Ok(frontend) = self.get_env_var("CLIENT_FRONTEND") {
            config.frontend = frontend;
        }

        if let Ok(timeout) = self.get_env_var("CLIENT_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid CLIENT_TIMEOUT_MS: {}", e))
            })?;
            config.timeout = Duration::from_millis(millis);
        }

        if let Ok(retries) = self.get_env_var("CLIENT_RETRIES") {
            config.retries = retries
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid CLIENT_RETRIES: {}", e)))?;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.get_env_var(name).is_ok())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
