//! Registered workers and their liveness

use pirate_protocol::{Identity, WorkerConfiguration};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::BrokerError;

/// One registered worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
    pub identity: Identity,
    pub capabilities: BTreeSet<i64>,
    pub is_config_handler: bool,
    /// Instant after which the worker is considered dead
    pub expiry: Instant,
}

impl WorkerRecord {
    pub fn new(identity: Identity, config: &WorkerConfiguration, expiry: Instant) -> Self {
        Self {
            identity,
            capabilities: config.supported_languages.iter().copied().collect(),
            is_config_handler: config.is_config_worker,
            expiry,
        }
    }

    pub fn supports(&self, language: i64) -> bool {
        self.capabilities.contains(&language)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry <= now
    }
}

impl fmt::Display for WorkerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} languages={:?} config={}",
            self.identity, self.capabilities, self.is_config_handler
        )
    }
}

/// Every worker the broker has seen register, keyed by identity.
///
/// Records are never removed: a purged worker that later heartbeats under the
/// same identity is still recognized.
#[derive(Debug)]
pub struct WorkerRegistry {
    expiry_window: Duration,
    records: HashMap<Identity, WorkerRecord>,
}

impl WorkerRegistry {
    /// `expiry_window` is heartbeat interval times liveness
    pub fn new(expiry_window: Duration) -> Self {
        Self {
            expiry_window,
            records: HashMap::new(),
        }
    }

    /// Create or overwrite the record for `identity`
    pub fn register(
        &mut self,
        identity: Identity,
        config: &WorkerConfiguration,
        now: Instant,
    ) -> &WorkerRecord {
        let record = WorkerRecord::new(identity.clone(), config, now + self.expiry_window);
        self.records.insert(identity.clone(), record);
        &self.records[&identity]
    }

    /// Push the expiry of a known worker forward
    pub fn heartbeat(
        &mut self,
        identity: &Identity,
        now: Instant,
    ) -> Result<&WorkerRecord, BrokerError> {
        let window = self.expiry_window;
        match self.records.get_mut(identity) {
            Some(record) => {
                record.expiry = now + window;
                Ok(&*record)
            }
            None => Err(BrokerError::UnrecognizedWorkerIdentity(identity.to_string())),
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&WorkerRecord> {
        self.records.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.records.values()
    }
}
