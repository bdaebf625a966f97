//! Heartbeat configuration shared by the broker and its workers

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Heartbeat cadence and liveness
///
/// Every peer of one broker must use the same values: the broker's idle queue
/// relies on liveness order matching expiry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Poll timeout and heartbeat period
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Missed intervals before a peer is considered dead
    pub liveness: u32,
}

impl HeartbeatConfig {
    /// Time after which a silent peer is declared dead
    pub fn expiry_window(&self) -> Duration {
        self.interval * self.liveness
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            liveness: 3,
        }
    }
}

impl Validatable for HeartbeatConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.interval.as_millis(), "interval", self.domain_name())?;
        validate_positive(self.liveness, "liveness", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "heartbeat"
    }
}
