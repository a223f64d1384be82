//! In-process backing store
//!
//! Implements the same contract as the Redis store over mutex-guarded maps.
//! Intended for tests and single-process deployments; TTLs are accepted but
//! not enforced, and published payloads are captured per channel so tests
//! can assert on wire traffic. The health toggle simulates a store outage.

use crate::store::{MessageStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    sorted: Mutex<HashMap<String, Vec<(String, f64)>>>,
    published: Mutex<HashMap<String, Vec<String>>>,
    subscriptions: Mutex<HashSet<String>>,
    healthy: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            sorted: Mutex::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashSet::new()),
            healthy: AtomicBool::new(true),
        }
    }

    /// Toggle simulated store health; while unhealthy every operation fails
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Payloads published on a channel, in publish order
    pub fn published(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Channels currently subscribed
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    fn check_health(&self) -> StoreResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connection("store unavailable".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check_health()
    }

    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
        self.check_health()?;
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_health()?;
        Ok(self.values.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_health()?;
        self.values.lock().remove(key);
        self.sorted.lock().remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.check_health()?;
        let mut sets = self.sorted.lock();
        let entries = sets.entry(key.to_string()).or_default();
        match entries.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 = score,
            None => entries.push((member.to_string(), score)),
        }
        Ok(())
    }

    async fn zpopmax(&self, key: &str) -> StoreResult<Option<(String, f64)>> {
        self.check_health()?;
        let mut sets = self.sorted.lock();
        let Some(entries) = sets.get_mut(key) else {
            return Ok(None);
        };

        let index = entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            })
            .map(|(i, _)| i);

        Ok(index.map(|i| entries.remove(i)))
    }

    async fn zpopmin(&self, key: &str) -> StoreResult<Option<(String, f64)>> {
        self.check_health()?;
        let mut sets = self.sorted.lock();
        let Some(entries) = sets.get_mut(key) else {
            return Ok(None);
        };

        let index = entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            })
            .map(|(i, _)| i);

        Ok(index.map(|i| entries.remove(i)))
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.check_health()?;
        Ok(self
            .sorted
            .lock()
            .get(key)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        self.check_health()?;
        self.published
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<()> {
        self.check_health()?;
        self.subscriptions.lock().insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> StoreResult<()> {
        self.check_health()?;
        self.subscriptions.lock().remove(channel);
        Ok(())
    }
}
