//! Logging setup for pirate processes
//!
//! Every process logs through `tracing`; this crate turns the logging
//! domain of the configuration into a global subscriber writing to stderr.

pub mod init;

pub use init::{build_filter, init_logging};
