//! Worker connector configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_endpoint, validate_positive, Validatable};

/// Worker connector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Broker backend address
    pub backend: String,

    /// Language ids this worker can process
    pub supported_languages: Vec<i64>,

    /// First reconnect delay
    #[serde(with = "humantime_serde")]
    pub interval_init: Duration,

    /// Upper bound for the reconnect delay
    #[serde(with = "humantime_serde")]
    pub interval_max: Duration,

    /// Log every inbound request at debug level
    #[serde(default = "crate::domains::utils::default_false")]
    pub log_messages: bool,

    /// Log every outbound response at debug level
    #[serde(default = "crate::domains::utils::default_false")]
    pub log_responses: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: "127.0.0.1:5556".to_string(),
            supported_languages: vec![0],
            interval_init: Duration::from_secs(1),
            interval_max: Duration::from_secs(32),
            log_messages: false,
            log_responses: false,
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_endpoint(&self.backend, "backend", self.domain_name())?;
        validate_positive(self.interval_init.as_millis(), "interval_init", self.domain_name())?;

        if self.interval_max < self.interval_init {
            return Err(self.validation_error(format!(
                "interval_max ({:?}) must not be smaller than interval_init ({:?})",
                self.interval_max, self.interval_init
            )));
        }

        if self.supported_languages.is_empty() {
            log::warn!("worker supports no languages and will only receive configuration requests");
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.supported_languages, vec![0]);
        assert!(!config.log_messages);
    }

    #[test]
    fn test_interval_bounds() {
        let config = WorkerConfig {
            interval_init: Duration::from_secs(10),
            interval_max: Duration::from_secs(5),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            interval_init: Duration::ZERO,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_languages_allowed() {
        let config = WorkerConfig {
            supported_languages: Vec::new(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
