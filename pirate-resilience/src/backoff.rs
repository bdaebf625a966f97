//! Backoff between reconnect attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of a capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// First delay
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Delays never exceed this value
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor applied after each delay
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Doubling backoff from `initial_delay` capped at `max_delay`
    pub fn doubling(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: default_multiplier(),
        }
    }

    /// Delay for a specific attempt (1-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt as i32 - 1);
        scale(self.initial_delay, factor).min(self.max_delay)
    }
}

fn default_multiplier() -> f64 {
    2.0
}

/// Multiply in whole nanoseconds so doubling stays exact
fn scale(delay: Duration, factor: f64) -> Duration {
    let nanos = (delay.as_nanos() as f64 * factor).round();
    if nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos.max(0.0) as u64)
    }
}

/// Stateful backoff: each [`next_delay`](Self::next_delay) returns the
/// current delay and grows the next one, until [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    current: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.initial_delay.min(policy.max_delay),
            policy,
            attempts: 0,
        }
    }

    /// Delay to wait before the upcoming attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Take the current delay and advance to the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempts = self.attempts.saturating_add(1);
        if self.current < self.policy.max_delay {
            self.current = scale(self.current, self.policy.multiplier).min(self.policy.max_delay);
        }
        delay
    }

    /// Return to the initial delay after a successful exchange
    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay.min(self.policy.max_delay);
        self.attempts = 0;
    }
}
