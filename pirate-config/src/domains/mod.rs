//! Domain-specific configuration modules

pub mod broker;
pub mod client;
pub mod heartbeat;
pub mod logging;
pub mod utils;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main configuration combining all domains
///
/// The broker and worker sections are optional so one file can configure a
/// broker process, a worker process, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PirateConfig {
    /// Heartbeat settings shared by every peer
    #[serde(default)]
    pub heartbeat: heartbeat::HeartbeatConfig,

    /// Broker configuration (optional, for broker mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<broker::BrokerConfig>,

    /// Worker configuration (optional, for worker mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<worker::WorkerConfig>,

    /// Client configuration (optional, for processes sending requests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<client::ClientConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl PirateConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.heartbeat.validate()?;
        self.logging.validate()?;

        if let Some(ref broker) = self.broker {
            broker.validate()?;
        }

        if let Some(ref worker) = self.worker {
            worker.validate()?;
        }

        if let Some(ref client) = self.client {
            client.validate()?;
        }

        Ok(())
    }

    /// Broker section, falling back to defaults when absent
    pub fn broker_or_default(&self) -> broker::BrokerConfig {
        self.broker.clone().unwrap_or_default()
    }

    /// Worker section, falling back to defaults when absent
    pub fn worker_or_default(&self) -> worker::WorkerConfig {
        self.worker.clone().unwrap_or_default()
    }

    /// Client section, falling back to defaults when absent
    pub fn client_or_default(&self) -> client::ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    /// Generate a sample configuration file with every section filled in
    pub fn generate_sample() -> String {
        let config = PirateConfig {
            broker: Some(broker::BrokerConfig::default()),
            worker: Some(worker::WorkerConfig::default()),
            client: Some(client::ClientConfig::default()),
            ..PirateConfig::default()
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PirateConfig::default();
        assert!(config.validate_all().is_ok());
        assert!(config.broker.is_none());
        assert_eq!(config.broker_or_default().frontend, "127.0.0.1:5555");
    }

    #[test]
    fn test_sample_parses_back() {
        let sample = PirateConfig::generate_sample();
        let parsed: PirateConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
        assert!(parsed.broker.is_some());
        assert!(parsed.worker.is_some());
        assert_eq!(parsed.client_or_default().retries, 3);
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let yaml = r#"
worker:
  backend: "nowhere"
"#;
        let config: PirateConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate_all().is_err());
    }
}
