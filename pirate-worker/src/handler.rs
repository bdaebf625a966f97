//! Interfaces implemented by the optimization code running in a worker

use async_trait::async_trait;
use pirate_protocol::Envelope;

use crate::error::ConnectorError;

/// Mandatory handler of every worker.
///
/// `run_id` is `None` when the broker forwarded a request without a run.
/// Business failures such as an invalid problem definition belong in the
/// returned envelope; an `Err` leaves the request unanswered.
#[async_trait]
pub trait OptimizationHandler: Send {
    /// Operation type produced by the worker's [`OperationRegistry`](crate::OperationRegistry)
    type Operation: Send + 'static;

    /// Start an algorithm run
    async fn configure(
        &mut self,
        run_id: Option<&str>,
        request: &Envelope,
    ) -> Result<Envelope, ConnectorError>;

    /// Stop an algorithm run
    async fn shutdown(
        &mut self,
        run_id: Option<&str>,
        request: &Envelope,
    ) -> Result<(), ConnectorError>;

    /// Run one operator
    async fn operate(
        &mut self,
        run_id: Option<&str>,
        operation: Self::Operation,
    ) -> Result<Envelope, ConnectorError>;
}

/// Optional handler answering run-less configuration requests.
///
/// Installing one makes the worker announce itself as a configuration worker.
#[async_trait]
pub trait ConfigurationHandler: Send {
    async fn get_configuration(&mut self, request: &Envelope) -> Result<Envelope, ConnectorError>;
}
