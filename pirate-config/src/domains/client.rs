//! Broker client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_endpoint, validate_positive, Validatable};

/// Settings for clients talking to the broker frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker frontend address
    pub frontend: String,

    /// How long one attempt waits for its reply
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempts per request before giving up. Every retry opens a fresh
    /// connection and resends the request unchanged.
    pub retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frontend: "127.0.0.1:5555".to_string(),
            timeout: Duration::from_millis(2500),
            retries: 3,
        }
    }
}

impl Validatable for ClientConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_endpoint(&self.frontend, "frontend", self.domain_name())?;
        validate_positive(self.timeout.as_millis(), "timeout", self.domain_name())?;
        validate_positive(self.retries, "retries", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "client"
    }
}
