//! Domain-driven configuration for the pirate broker and its workers
//!
//! Configuration is split by functional domain (heartbeat, broker, worker,
//! client, logging), loaded from YAML with `PIRATE_` environment overrides and
//! validated per domain.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    broker::BrokerConfig,
    client::ClientConfig,
    heartbeat::HeartbeatConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    worker::WorkerConfig,
    PirateConfig,
};
