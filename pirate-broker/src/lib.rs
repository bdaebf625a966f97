//! Paranoid Pirate broker
//!
//! Tracks worker liveness, keeps an LRU queue of idle workers and routes
//! client requests to a worker able to handle the run's language.

pub mod broker;
pub mod error;
pub mod queue;
pub mod run_cache;
pub mod worker;

pub use broker::{Broker, BrokerStats};
pub use error::BrokerError;
pub use queue::WorkerQueue;
pub use run_cache::RunLanguageCache;
pub use worker::{WorkerRecord, WorkerRegistry};
