//! Worker connector for the pirate broker
//!
//! Optimization code implements [`OptimizationHandler`] (and optionally
//! [`ConfigurationHandler`]), registers the operations it understands in an
//! [`OperationRegistry`] and hands both to a [`Connector`], which keeps the
//! broker registration alive and routes requests to the handlers.

pub mod connector;
pub mod dispatch;
pub mod error;
pub mod handler;

pub use connector::{Connector, ConnectorStats};
pub use dispatch::{
    OperationRegistry, Request, CONFIGURATION_REQUEST, START_ALGORITHM_REQUEST,
    STOP_ALGORITHM_REQUEST,
};
pub use error::ConnectorError;
pub use handler::{ConfigurationHandler, OptimizationHandler};
