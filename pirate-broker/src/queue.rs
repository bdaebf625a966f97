//! Idle worker queue
//!
//! Least recently observed worker at the head. All workers of one broker
//! share the same heartbeat settings, so head-to-tail order is also expiry
//! order and purging can stop at the first live worker.

use pirate_protocol::Identity;
use std::collections::VecDeque;
use tokio::time::Instant;

use crate::error::BrokerError;
use crate::worker::{WorkerRecord, WorkerRegistry};

#[derive(Debug, Default)]
pub struct WorkerQueue {
    entries: VecDeque<Identity>,
}

impl WorkerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker at the tail, dropping any older entry for it
    pub fn push(&mut self, identity: Identity) {
        self.entries.retain(|entry| *entry != identity);
        self.entries.push_back(identity);
    }

    /// Remove and return the least recently observed worker
    pub fn pop(&mut self) -> Result<Identity, BrokerError> {
        self.entries.pop_front().ok_or(BrokerError::NoWorkerAvailable)
    }

    /// Oldest idle worker able to process `language`.
    ///
    /// The worker stays queued: it remains eligible until it is purged or
    /// re-observed, so it may be picked again before it answers.
    pub fn pop_language(
        &self,
        language: i64,
        registry: &WorkerRegistry,
    ) -> Result<Identity, BrokerError> {
        self.find(registry, |record| record.supports(language))
            .ok_or(BrokerError::NoWorkerForLanguage(language))
    }

    /// With `wants_config_handler` unset this is [`pop`](Self::pop).
    /// Otherwise the oldest configuration worker is returned and stays queued.
    pub fn pop_config(
        &mut self,
        wants_config_handler: bool,
        registry: &WorkerRegistry,
    ) -> Result<Identity, BrokerError> {
        if !wants_config_handler {
            return self.pop();
        }
        self.find(registry, |record| record.is_config_handler)
            .ok_or(BrokerError::NoConfigWorker)
    }

    /// Remove the expired workers at the head of the queue
    ///
    /// Entries without a registry record are treated as expired.
    pub fn purge(&mut self, now: Instant, registry: &WorkerRegistry) -> Vec<Identity> {
        let mut purged = Vec::new();
        while let Some(head) = self.entries.front() {
            let expired = registry
                .get(head)
                .map(|record| record.is_expired(now))
                .unwrap_or(true);
            if !expired {
                break;
            }
            if let Some(identity) = self.entries.pop_front() {
                purged.push(identity);
            }
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries.contains(identity)
    }

    /// Identities from head to tail
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn find<P>(&self, registry: &WorkerRegistry, predicate: P) -> Option<Identity>
    where
        P: Fn(&WorkerRecord) -> bool,
    {
        self.entries
            .iter()
            .find(|identity| registry.get(identity).map(&predicate).unwrap_or(false))
            .cloned()
    }
}
