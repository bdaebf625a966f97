//! Run to language bindings

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Binding {
    language: i64,
    last_used: Instant,
    /// Requests of the run currently held by a worker
    in_flight: u32,
}

/// Language of every active run.
///
/// A binding is created by the first message of a run and never changes
/// while it lives. Bindings idle for longer than the TTL are evicted; a
/// binding with a request in flight is never idle.
#[derive(Debug)]
pub struct RunLanguageCache {
    ttl: Option<Duration>,
    bindings: HashMap<Bytes, Binding>,
}

impl RunLanguageCache {
    /// `ttl` of `None` keeps bindings forever
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            bindings: HashMap::new(),
        }
    }

    /// Language bound to `run_id`, refreshing the binding
    pub fn get(&mut self, run_id: &[u8], now: Instant) -> Option<i64> {
        self.bindings.get_mut(run_id).map(|binding| {
            binding.last_used = now;
            binding.language
        })
    }

    /// Bind `run_id` to `language` unless already bound; returns the bound language
    pub fn bind(&mut self, run_id: Bytes, language: i64, now: Instant) -> i64 {
        let binding = self.bindings.entry(run_id).or_insert(Binding {
            language,
            last_used: now,
            in_flight: 0,
        });
        binding.last_used = now;
        binding.language
    }

    /// A request of `run_id` was handed to a worker
    pub fn pin(&mut self, run_id: &[u8], now: Instant) {
        if let Some(binding) = self.bindings.get_mut(run_id) {
            binding.in_flight += 1;
            binding.last_used = now;
        }
    }

    /// The worker holding a request of `run_id` answered or went away
    pub fn release(&mut self, run_id: &[u8], now: Instant) {
        if let Some(binding) = self.bindings.get_mut(run_id) {
            binding.in_flight = binding.in_flight.saturating_sub(1);
            binding.last_used = now;
        }
    }

    pub fn contains(&self, run_id: &[u8]) -> bool {
        self.bindings.contains_key(run_id)
    }

    /// Drop bindings idle for longer than the TTL, returning how many went
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.bindings.len();
        self.bindings.retain(|_, binding| {
            binding.in_flight > 0 || now.saturating_duration_since(binding.last_used) < ttl
        });
        before - self.bindings.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
