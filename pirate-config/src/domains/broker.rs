//! Broker endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_endpoint, Validatable};

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address clients connect to
    pub frontend: String,

    /// Address workers connect to
    pub backend: String,

    /// Idle time after which a run's language binding is forgotten.
    /// `None` keeps bindings for the lifetime of the broker.
    #[serde(with = "humantime_serde")]
    pub run_binding_ttl: Option<Duration>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            frontend: "127.0.0.1:5555".to_string(),
            backend: "127.0.0.1:5556".to_string(),
            run_binding_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl Validatable for BrokerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_endpoint(&self.frontend, "frontend", self.domain_name())?;
        validate_endpoint(&self.backend, "backend", self.domain_name())?;

        if self.frontend == self.backend {
            return Err(self.validation_error("frontend and backend must be different endpoints"));
        }

        if self.run_binding_ttl == Some(Duration::ZERO) {
            return Err(self.validation_error("run_binding_ttl must be greater than 0 when set"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "broker"
    }
}
