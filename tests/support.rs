//! Shared fixtures: a OneMax worker and configuration helpers
#![allow(dead_code)]

use async_trait::async_trait;
use pirate_config::PirateConfig;
use pirate_protocol::{DealerConnector, Envelope, TypedMessage};
use pirate_worker::{
    ConfigurationHandler, Connector, ConnectorError, OperationRegistry, OptimizationHandler,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub genome: Vec<u8>,
}

impl TypedMessage for EvaluateRequest {
    const TYPE_TAG: &'static str = "EvaluateRequest";
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub fitness: u32,
}

impl TypedMessage for EvaluateResponse {
    const TYPE_TAG: &'static str = "EvaluateResponse";
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationResponse {
    pub algorithms: Vec<String>,
}

impl TypedMessage for ConfigurationResponse {
    const TYPE_TAG: &'static str = "ConfigurationResponse";
}

pub enum Operation {
    Evaluate(EvaluateRequest),
}

/// Evaluates OneMax bit strings
#[derive(Default)]
pub struct OneMax {
    pub active_runs: Vec<String>,
}

#[async_trait]
impl OptimizationHandler for OneMax {
    type Operation = Operation;

    async fn configure(
        &mut self,
        run_id: Option<&str>,
        _request: &Envelope,
    ) -> Result<Envelope, ConnectorError> {
        if let Some(run_id) = run_id {
            self.active_runs.push(run_id.to_string());
        }
        Ok(Envelope::new("StartAlgorithmResponse", b"{}".to_vec()))
    }

    async fn shutdown(
        &mut self,
        run_id: Option<&str>,
        _request: &Envelope,
    ) -> Result<(), ConnectorError> {
        self.active_runs.retain(|run| Some(run.as_str()) != run_id);
        Ok(())
    }

    async fn operate(
        &mut self,
        _run_id: Option<&str>,
        operation: Operation,
    ) -> Result<Envelope, ConnectorError> {
        match operation {
            Operation::Evaluate(request) => {
                let fitness = request.genome.iter().filter(|bit| **bit == 1).count() as u32;
                Envelope::pack(&EvaluateResponse { fitness }).map_err(ConnectorError::handler)
            }
        }
    }
}

pub struct Catalog;

#[async_trait]
impl ConfigurationHandler for Catalog {
    async fn get_configuration(&mut self, _request: &Envelope) -> Result<Envelope, ConnectorError> {
        Envelope::pack(&ConfigurationResponse {
            algorithms: vec!["ga".to_string(), "es".to_string()],
        })
        .map_err(ConnectorError::handler)
    }
}

pub fn config(interval: Duration, languages: Vec<i64>) -> PirateConfig {
    let mut config = PirateConfig::default();
    config.heartbeat.interval = interval;
    let mut worker = config.worker_or_default();
    worker.supported_languages = languages;
    worker.interval_init = interval;
    worker.interval_max = interval * 4;
    config.worker = Some(worker);
    config
}

pub fn onemax_worker(
    config: &PirateConfig,
    transport: impl DealerConnector + 'static,
) -> Connector<OneMax> {
    Connector::new(config, transport, OneMax::default())
        .with_operations(OperationRegistry::new().register(Operation::Evaluate))
}

/// OneMax worker dialing `config.worker.backend` over TCP
pub fn onemax_tcp_worker(config: &PirateConfig) -> Connector<OneMax> {
    Connector::tcp(config, OneMax::default())
        .with_operations(OperationRegistry::new().register(Operation::Evaluate))
}

pub fn evaluate(genome: &[u8]) -> Envelope {
    Envelope::pack(&EvaluateRequest {
        genome: genome.to_vec(),
    })
    .unwrap()
}
