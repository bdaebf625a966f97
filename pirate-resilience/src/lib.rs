//! Resilience patterns for pirate peers
//!
//! Currently this is the capped exponential backoff a worker applies between
//! reconnect attempts after losing its broker.

pub mod backoff;

// Re-export commonly used types
pub use backoff::{BackoffPolicy, ReconnectBackoff};
